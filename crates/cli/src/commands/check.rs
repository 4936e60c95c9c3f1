//! Configuration check command.
//!
//! Loads a `cadence.toml`, runs every validation rule, derives the consensus
//! parameters and genesis set, and prints what the core would start with.

use cadence_config::Config;
use cadence_consensus::{ConsensusParams, Genesis};
use cadence_types::Role;
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::utils::{format_amount, print_success, CliResult, OutputFormat};
use crate::DEFAULT_CONFIG_FILE;

/// Arguments for the check-config command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Configuration file to check
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

/// Summary of a configuration that passed every check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSummary {
    /// Chain ID
    pub chain_id: u64,
    /// Chain name
    pub chain_name: String,
    /// Minimum sequencer stake
    pub min_sequencer_stake: u128,
    /// Minimum validator stake
    pub min_validator_stake: u128,
    /// Blocks per scheduled rotation
    pub rotation_interval_blocks: u64,
    /// Blocks of leader inactivity before a timeout
    pub timeout_blocks: u64,
    /// Epoch length in seconds
    pub epoch_duration_secs: u64,
    /// Force-inclusion window in blocks
    pub inclusion_window_blocks: u64,
    /// Genesis sequencers
    pub genesis_sequencers: usize,
    /// Genesis validators
    pub genesis_validators: usize,
    /// Authorized managers
    pub managers: usize,
}

/// Load and validate `path`, returning the derived summary.
pub fn check(path: &Path) -> CliResult<ConfigSummary> {
    let config = Config::load(path)?;
    let params = ConsensusParams::try_from(&config)?;
    let genesis = Genesis::try_from(&config.genesis)?;

    let count = |role: Role| genesis.participants.iter().filter(|p| p.role == role).count();
    Ok(ConfigSummary {
        chain_id: params.chain_id,
        chain_name: config.chain.chain_name.clone(),
        min_sequencer_stake: params.min_sequencer_stake,
        min_validator_stake: params.min_validator_stake,
        rotation_interval_blocks: params.rotation_interval_blocks,
        timeout_blocks: params.timeout_blocks,
        epoch_duration_secs: params.epoch_duration_secs,
        inclusion_window_blocks: params.inclusion_window_blocks,
        genesis_sequencers: count(Role::Sequencer),
        genesis_validators: count(Role::Validator),
        managers: params.managers.len(),
    })
}

/// Execute the check-config command
pub fn execute(args: CheckArgs, output_format: OutputFormat) -> CliResult<()> {
    let summary = check(&args.config)?;

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => {
            print_success(&format!("{} is valid", args.config.display()));
            println!("  Chain:              {} ({})", summary.chain_name, summary.chain_id);
            println!("  Min sequencer:      {}", format_amount(summary.min_sequencer_stake));
            println!("  Min validator:      {}", format_amount(summary.min_validator_stake));
            println!("  Rotation interval:  {} blocks", summary.rotation_interval_blocks);
            println!("  Leader timeout:     {} blocks", summary.timeout_blocks);
            println!("  Epoch duration:     {}s", summary.epoch_duration_secs);
            println!("  Inclusion window:   {} blocks", summary.inclusion_window_blocks);
            println!(
                "  Genesis:            {} sequencer(s), {} validator(s)",
                summary.genesis_sequencers, summary.genesis_validators
            );
            println!("  Managers:           {}", summary.managers);
        }
    }

    Ok(())
}
