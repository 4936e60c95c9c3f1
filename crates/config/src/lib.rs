//! # Cadence Configuration
//!
//! Configuration parsing and genesis handling for the Cadence consensus core.
//!
//! All parameters live in a single `cadence.toml` file.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cadence_config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("cadence.toml"))?;
//! println!("Rotation every {} blocks", config.rotation.rotation_interval_blocks);
//! ```
//!
//! ## Configuration Sections
//!
//! - `[chain]` - Chain identity (chain_id, name)
//! - `[registry]` - Minimum stakes, managers, escrow and treasury accounts
//! - `[rotation]` - Rotation interval, timeout window, timeout limit
//! - `[election]` - Stake per unit of voting power
//! - `[attestation]` - Maximum attestation age
//! - `[slashing]` - Penalty rates, jail duration, uptime threshold
//! - `[epoch]` - Epoch duration
//! - `[force_inclusion]` - Inclusion window and oracle
//! - `[logging]` - Log level and format
//! - `[[genesis.balances]]` - Opening ledger balances
//! - `[[genesis.participants]]` - Participants registered at genesis

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

mod config;
mod error;
mod genesis;

pub use config::*;
pub use error::*;
pub use genesis::*;
