//! # Cadence Crypto
//!
//! Signing primitives for Cadence participants:
//! - **Keccak256** digests (shared with [`cadence_types::H256`])
//! - **secp256k1 ECDSA** with public-key recovery, so signatures can be
//!   attributed to a 20-byte [`cadence_types::Address`]
//!
//! ## Example
//!
//! ```rust
//! use cadence_crypto::{keccak256, PrivateKey};
//!
//! let key = PrivateKey::from_seed(b"validator-0");
//! let digest = keccak256(b"attestation");
//! let sig = key.sign_prehash(&digest).unwrap();
//! assert_eq!(sig.recover_prehash(&digest).unwrap().to_address(), key.address());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod ecdsa;

pub use ecdsa::{PrivateKey, PublicKey, Signature, SIGNATURE_LENGTH};

/// Keccak256 of `data` as a raw array.
#[inline]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    cadence_types::H256::keccak256(data).into()
}

/// Error types for cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Invalid private key bytes
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Invalid signature bytes
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Failed to recover public key from signature
    #[error("failed to recover public key: {0}")]
    RecoveryFailed(String),

    /// Invalid input length
    #[error("invalid input length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Hex decoding error
    #[error("hex decoding error: {0}")]
    HexError(#[from] hex::FromHexError),
}

/// Result type for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;
