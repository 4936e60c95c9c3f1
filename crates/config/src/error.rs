//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        /// File being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write configuration file
    #[error("Failed to write config file at {path}: {source}")]
    FileWrite {
        /// File being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration
    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to render TOML configuration
    #[error("Failed to serialize TOML config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Invalid chain ID (must be non-zero)
    #[error("Invalid chain ID: chain_id must be non-zero")]
    InvalidChainId,

    /// Amount string is not a valid unsigned integer
    #[error("Invalid amount for {name}: {value}")]
    InvalidAmount {
        /// Field name
        name: &'static str,
        /// Offending value
        value: String,
    },

    /// Minimum stake for a role cannot be zero
    #[error("Invalid minimum stake: {0} cannot be zero")]
    ZeroMinStake(&'static str),

    /// A block or time interval must be positive
    #[error("Invalid interval: {name} must be positive")]
    ZeroInterval {
        /// Field name
        name: &'static str,
    },

    /// Timeout window must be strictly shorter than the rotation interval
    #[error("Invalid rotation: timeout_blocks ({timeout}) must be less than rotation_interval_blocks ({interval})")]
    TimeoutExceedsRotation {
        /// Configured timeout window
        timeout: u64,
        /// Configured rotation interval
        interval: u64,
    },

    /// Invalid basis points value
    #[error("Invalid {name}: must be <= 10000 basis points, got {value}")]
    InvalidBasisPoints {
        /// Field name
        name: &'static str,
        /// Offending value
        value: u32,
    },

    /// A system account is the zero address or collides with another
    #[error("Invalid system account {name}: {reason}")]
    InvalidSystemAccount {
        /// Field name
        name: &'static str,
        /// Why it was rejected
        reason: &'static str,
    },

    /// Duplicate genesis participant
    #[error("Duplicate genesis {role}: {address}")]
    DuplicateParticipant {
        /// Role the duplicate was listed under
        role: String,
        /// Duplicate address
        address: String,
    },

    /// Genesis participant stake below minimum
    #[error("Genesis {role} {address} has stake {stake} below minimum {min_stake}")]
    StakeBelowMinimum {
        /// Participant role
        role: String,
        /// Participant address
        address: String,
        /// Listed stake
        stake: String,
        /// Role minimum
        min_stake: String,
    },

    /// Genesis validator has no voting power
    #[error("Genesis validator {0} has stake below one unit of voting power")]
    ZeroVotingPower(String),

    /// Genesis participant cannot fund its stake
    #[error("Genesis participant {address} stakes {stake} but is funded with only {balance}")]
    UnfundedStake {
        /// Participant address
        address: String,
        /// Listed stake
        stake: String,
        /// Funded balance
        balance: String,
    },

    /// Invalid log level
    #[error("Invalid log level: {0}. Valid values: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Invalid log format
    #[error("Invalid log format: {0}. Valid values: json, pretty, compact")]
    InvalidLogFormat(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
