//! # ECDSA over secp256k1
//!
//! Participants sign attestations and double-sign evidence with secp256k1 keys.
//! The consensus core never holds public keys: it recovers the signer address
//! from `(message, signature)` and compares it with the claimed identity.
//!
//! ## Example
//!
//! ```rust
//! use cadence_crypto::ecdsa::PrivateKey;
//!
//! let key = PrivateKey::random();
//! let signature = key.sign(b"attest").unwrap();
//! assert_eq!(signature.recover_address(b"attest").unwrap(), key.address());
//! ```

use crate::{keccak256, CryptoError, Result};
use cadence_types::Address;
use k256::{
    ecdsa::{RecoveryId, Signature as K256Signature, SigningKey, VerifyingKey},
    elliptic_curve::sec1::ToEncodedPoint,
    SecretKey,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Length of an encoded signature (r || s || v).
pub const SIGNATURE_LENGTH: usize = 65;

/// secp256k1 secret key.
#[derive(Clone)]
pub struct PrivateKey {
    inner: SigningKey,
}

impl PrivateKey {
    /// Generates a key from the operating system RNG.
    pub fn random() -> Self {
        Self {
            inner: SigningKey::from(SecretKey::random(&mut OsRng)),
        }
    }

    /// Creates a key from its 32 secret bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let secret = SecretKey::from_bytes(bytes.into())
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self {
            inner: SigningKey::from(secret),
        })
    }

    /// Creates a key from hex (with or without `0x`).
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Self::from_bytes(&arr)
    }

    /// Derives a key deterministically from a seed phrase.
    ///
    /// The secret is `keccak256(seed)`, re-hashed until it lands in the curve
    /// order. Used for reproducible simulations; not for production keys.
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut candidate = keccak256(seed);
        loop {
            if let Ok(secret) = SecretKey::from_bytes((&candidate).into()) {
                return Self {
                    inner: SigningKey::from(secret),
                };
            }
            candidate = keccak256(&candidate);
        }
    }

    /// The secret bytes. Handle with care.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes().into()
    }

    /// The matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: *self.inner.verifying_key(),
        }
    }

    /// The address owning this key.
    pub fn address(&self) -> Address {
        self.public_key().to_address()
    }

    /// Hashes `data` with Keccak256 and signs the digest.
    pub fn sign(&self, data: &[u8]) -> Result<Signature> {
        self.sign_prehash(&keccak256(data))
    }

    /// Signs a 32-byte digest, producing a recoverable signature.
    pub fn sign_prehash(&self, digest: &[u8; 32]) -> Result<Signature> {
        let (sig, recovery_id) = self
            .inner
            .sign_prehash_recoverable(digest)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        Ok(Signature {
            r: sig.r().to_bytes().into(),
            s: sig.s().to_bytes().into(),
            v: recovery_id.to_byte(),
        })
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey {
    inner: VerifyingKey,
}

impl PublicKey {
    /// Uncompressed encoding without the `0x04` prefix.
    pub fn to_uncompressed(&self) -> [u8; 64] {
        let point = self.inner.to_encoded_point(false);
        let mut out = [0u8; 64];
        out.copy_from_slice(&point.as_bytes()[1..65]);
        out
    }

    /// Compressed SEC1 encoding.
    pub fn to_compressed(&self) -> [u8; 33] {
        let point = self.inner.to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// The 20-byte address: last 20 bytes of `keccak256(uncompressed)`.
    pub fn to_address(&self) -> Address {
        Address::from_public_key(&self.to_uncompressed())
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("compressed", &hex::encode(self.to_compressed()))
            .finish()
    }
}

/// Recoverable ECDSA signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    /// r component
    pub r: [u8; 32],
    /// s component
    pub s: [u8; 32],
    /// Recovery id (0/1, or legacy 27/28)
    pub v: u8,
}

impl Signature {
    /// Creates a signature from its components.
    pub fn new(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Self { r, s, v }
    }

    /// Decodes `r || s || v`.
    pub fn from_bytes(bytes: &[u8; SIGNATURE_LENGTH]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);
        Self { r, s, v: bytes[64] }
    }

    /// Decodes a hex-encoded `r || s || v`.
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw)?;
        let arr: [u8; SIGNATURE_LENGTH] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidLength {
                    expected: SIGNATURE_LENGTH,
                    actual: bytes.len(),
                })?;
        Ok(Self::from_bytes(&arr))
    }

    /// Encodes as `r || s || v`.
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[0..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    /// `0x`-prefixed hex of [`Signature::to_bytes`].
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    /// Recovery id normalized to 0 or 1.
    pub fn v_normalized(&self) -> u8 {
        if self.v >= 27 {
            self.v - 27
        } else {
            self.v
        }
    }

    fn to_k256(&self) -> Result<K256Signature> {
        let mut bytes = [0u8; 64];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        K256Signature::from_bytes((&bytes).into())
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }

    /// Recovers the signing public key from a 32-byte digest.
    pub fn recover_prehash(&self, digest: &[u8; 32]) -> Result<PublicKey> {
        let sig = self.to_k256()?;
        let recovery_id = RecoveryId::from_byte(self.v_normalized())
            .ok_or_else(|| CryptoError::RecoveryFailed("invalid recovery id".to_string()))?;
        let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id)
            .map_err(|e| CryptoError::RecoveryFailed(e.to_string()))?;
        Ok(PublicKey { inner: key })
    }

    /// Recovers the signer address of `data` (hashed with Keccak256).
    pub fn recover_address(&self, data: &[u8]) -> Result<Address> {
        Ok(self.recover_prehash(&keccak256(data))?.to_address())
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signature")
            .field("r", &hex::encode(self.r))
            .field("s", &hex::encode(self.s))
            .field("v", &self.v)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_recover() {
        let key = PrivateKey::random();
        let sig = key.sign(b"payload").unwrap();
        assert_eq!(sig.recover_address(b"payload").unwrap(), key.address());
    }

    #[test]
    fn test_recover_other_message_gives_other_address() {
        let key = PrivateKey::random();
        let sig = key.sign(b"payload").unwrap();
        // Recovery on a different message either fails or yields a different signer
        match sig.recover_address(b"tampered") {
            Ok(addr) => assert_ne!(addr, key.address()),
            Err(_) => {}
        }
    }

    #[test]
    fn test_known_address_vector() {
        let key = PrivateKey::from_hex(
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
        )
        .unwrap();
        assert_eq!(
            format!("{:#x}", key.address()),
            "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"
        );
    }

    #[test]
    fn test_from_seed_is_deterministic() {
        let a = PrivateKey::from_seed(b"sequencer-1");
        let b = PrivateKey::from_seed(b"sequencer-1");
        let c = PrivateKey::from_seed(b"sequencer-2");
        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), c.address());
    }

    #[test]
    fn test_signature_bytes_roundtrip() {
        let key = PrivateKey::random();
        let sig = key.sign(b"x").unwrap();
        assert_eq!(Signature::from_bytes(&sig.to_bytes()), sig);
        assert_eq!(Signature::from_hex(&sig.to_hex()).unwrap(), sig);
    }

    #[test]
    fn test_legacy_v_normalization() {
        let key = PrivateKey::random();
        let mut sig = key.sign(b"legacy").unwrap();
        sig.v += 27;
        assert_eq!(sig.recover_address(b"legacy").unwrap(), key.address());
    }
}
