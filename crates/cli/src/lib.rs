//! # Cadence CLI
//!
//! Command-line tools for the Cadence consensus core.
//!
//! ## Available Commands
//!
//! - `init` - Write a default `cadence.toml`
//! - `check-config` - Validate a configuration and print the derived parameters
//! - `simulate` - Run a deterministic in-memory network and print its events
//! - `version` - Display version information
//!
//! ## Example Usage
//!
//! ```bash
//! # Write a configuration to edit
//! cadence init --dir ./devnet
//!
//! # Check it
//! cadence check-config --config ./devnet/cadence.toml
//!
//! # Simulate 500 blocks with one sequencer that never produces
//! cadence simulate --config ./devnet/cadence.toml --blocks 500 --offline 1 --output json
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod commands;
pub mod utils;

pub use commands::{run_cli, Cli, Commands};
pub use utils::{CliError, CliResult, LogFormat, OutputFormat};

/// Version information for the CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI application name
pub const APP_NAME: &str = "cadence";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "cadence.toml";
