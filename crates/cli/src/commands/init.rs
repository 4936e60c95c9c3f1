//! Configuration initialization command.
//!
//! `cadence init` writes a default `cadence.toml` that passes validation, so
//! it can be edited and then fed to `check-config` or `simulate`.

use cadence_config::Config;
use clap::Parser;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

use crate::utils::{print_info, print_success, CliError, CliResult, OutputFormat};
use crate::DEFAULT_CONFIG_FILE;

/// Arguments for the init command
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory to write the configuration into
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// Chain ID for the network
    #[arg(long)]
    pub chain_id: Option<u64>,

    /// Human-readable chain name
    #[arg(long)]
    pub chain_name: Option<String>,

    /// Overwrite existing configuration
    #[arg(long)]
    pub force: bool,
}

/// Result of a successful init
#[derive(Debug, Serialize)]
pub struct InitResult {
    /// Path of the written file
    pub config_file: String,
    /// Chain ID written
    pub chain_id: u64,
    /// Chain name written
    pub chain_name: String,
}

/// Build the configuration `init` would write.
pub fn default_config(args: &InitArgs) -> CliResult<Config> {
    let mut config = Config::default();
    if let Some(chain_id) = args.chain_id {
        config.chain.chain_id = chain_id;
    }
    if let Some(name) = &args.chain_name {
        config.chain.chain_name = name.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Execute the init command
pub fn execute(args: InitArgs, output_format: OutputFormat) -> CliResult<()> {
    let config_path = args.dir.join(DEFAULT_CONFIG_FILE);
    if config_path.exists() && !args.force {
        return Err(CliError::AlreadyExists(config_path));
    }

    let config = default_config(&args)?;
    if !args.dir.exists() {
        fs::create_dir_all(&args.dir)?;
        tracing::debug!("Created directory: {}", args.dir.display());
    }
    config.save(&config_path)?;
    print_info(&format!("Wrote {}", config_path.display()));

    let result = InitResult {
        config_file: config_path.to_string_lossy().to_string(),
        chain_id: config.chain.chain_id,
        chain_name: config.chain.chain_name.clone(),
    };

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        OutputFormat::Text => {
            print_success("Configuration initialized");
            println!("  Config File: {}", result.config_file);
            println!("  Chain:       {} ({})", result.chain_name, result.chain_id);
            println!();
            println!("Next steps:");
            println!("  cadence check-config --config {}", result.config_file);
            println!("  cadence simulate --config {}", result.config_file);
        }
    }

    Ok(())
}
