//! Tests for signer recovery as used by attestation checks

use cadence_crypto::{keccak256, CryptoError, PrivateKey, Signature};

#[test]
fn test_distinct_random_keys() {
    let a = PrivateKey::random();
    let b = PrivateKey::random();
    assert_ne!(a.address(), b.address());
}

#[test]
fn test_private_key_bytes_roundtrip() {
    let key = PrivateKey::from_seed(b"roundtrip");
    let restored = PrivateKey::from_bytes(&key.to_bytes()).unwrap();
    assert_eq!(restored.address(), key.address());
}

#[test]
fn test_prehash_and_data_signing_agree() {
    let key = PrivateKey::from_seed(b"agree");
    let data = b"block 10";
    let sig = key.sign(data).unwrap();
    let recovered = sig.recover_prehash(&keccak256(data)).unwrap();
    assert_eq!(recovered.to_address(), key.address());
}

#[test]
fn test_signatures_from_different_keys_recover_differently() {
    let alice = PrivateKey::from_seed(b"alice");
    let bob = PrivateKey::from_seed(b"bob");
    let msg = b"same message";
    let sig_a = alice.sign(msg).unwrap();
    let sig_b = bob.sign(msg).unwrap();
    assert_eq!(sig_a.recover_address(msg).unwrap(), alice.address());
    assert_eq!(sig_b.recover_address(msg).unwrap(), bob.address());
}

#[test]
fn test_zero_signature_fails_recovery() {
    let sig = Signature::new([0u8; 32], [0u8; 32], 0);
    assert!(matches!(
        sig.recover_address(b"anything"),
        Err(CryptoError::InvalidSignature(_))
    ));
}

#[test]
fn test_bad_recovery_id_rejected() {
    let key = PrivateKey::from_seed(b"recid");
    let mut sig = key.sign(b"m").unwrap();
    sig.v = 9;
    assert!(sig.recover_address(b"m").is_err());
}

#[test]
fn test_signature_hex_length_checked() {
    assert!(matches!(
        Signature::from_hex("0x1234"),
        Err(CryptoError::InvalidLength { expected: 65, actual: 2 })
    ));
}

#[test]
fn test_signature_serde_json() {
    let key = PrivateKey::from_seed(b"serde");
    let sig = key.sign(b"m").unwrap();
    let json = serde_json::to_string(&sig).unwrap();
    let decoded: Signature = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, sig);
}
