//! # Cadence Types
//!
//! Value types shared by every Cadence crate:
//! - [`Address`] - 20-byte participant identity
//! - [`H256`] - 32-byte Keccak256 digest
//! - [`Role`] - sequencer or validator
//! - scalar aliases ([`Stake`], [`VotingPower`], [`BlockNumber`], ...)
//!
//! ## Example
//!
//! ```rust
//! use cadence_types::{Address, H256, Role};
//!
//! let escrow = Address::from_low_u64_be(0xE5C0);
//! let hash = H256::keccak256(b"hello world");
//! assert_ne!(hash, H256::ZERO);
//! assert_eq!(Role::Sequencer.to_string(), "sequencer");
//! # let _ = escrow;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod address;
pub mod hash;
pub mod role;

pub use address::Address;
pub use hash::H256;
pub use role::{
    BasisPoints, BlockNumber, Role, Stake, Timestamp, VotingPower, BPS_DENOMINATOR,
};

/// Result type alias for Cadence type conversions
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when parsing Cadence types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Invalid length for a fixed-size type
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Invalid address format
    #[error("invalid address format: {0}")]
    InvalidAddress(String),

    /// Invalid hash format
    #[error("invalid hash format: {0}")]
    InvalidHash(String),

    /// Unknown role name
    #[error("unknown role: {0}")]
    InvalidRole(String),
}
