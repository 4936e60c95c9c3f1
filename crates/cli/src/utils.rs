//! Shared utilities for CLI commands.
//!
//! This module provides common functionality used across CLI commands:
//! - Error types and result handling
//! - Output and log formatting options
//! - Status messages on stderr

use cadence_config::ConfigError;
use cadence_consensus::ConsensusError;
use cadence_crypto::CryptoError;
use clap::ValueEnum;
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// CLI error types
#[derive(Error, Debug)]
pub enum CliError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or validated
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The consensus core rejected an operation
    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    /// Key or signature failure
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Refusing to overwrite an existing file
    #[error("{} already exists. Use --force to overwrite.", .0.display())]
    AlreadyExists(PathBuf),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Metrics could not be registered or encoded
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// CLI result type alias
pub type CliResult<T> = Result<T, CliError>;

// ============================================================================
// Output Formatting
// ============================================================================

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output for scripting
    Json,
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum LogFormat {
    /// Human-readable lines with targets
    #[default]
    Text,
    /// One JSON object per line
    Json,
    /// Abbreviated single-line format
    Compact,
}

/// Print an info message to stderr (so JSON output stays clean)
pub fn print_info(msg: &str) {
    eprintln!("[INFO] {}", msg);
}

/// Print a success message to stderr
pub fn print_success(msg: &str) {
    eprintln!("[OK] {}", msg);
}

/// Print a warning message to stderr
pub fn print_warning(msg: &str) {
    eprintln!("[WARN] {}", msg);
}

/// Format a base-unit amount with thousands separators.
pub fn format_amount(amount: u128) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
