//! CLI command definitions and handlers.
//!
//! This module defines all available CLI commands using clap's derive macros.
//! Each subcommand has its own module with implementation details.

pub mod check;
pub mod init;
pub mod simulate;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::utils::{CliResult, LogFormat, OutputFormat};

/// Cadence - rollup sequencer rotation and validator attestation
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(version)]
#[command(about = "Cadence consensus core tools", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Global output format for command results
    #[arg(global = true, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Log line format
    #[arg(global = true, long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Enable verbose logging
    #[arg(global = true, short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(global = true, short, long)]
    pub quiet: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log filter directive implied by `--quiet` and `-v`.
    pub fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "error",
            (_, 0) => "info",
            (_, 1) => "debug",
            (_, _) => "trace",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default cadence.toml
    Init(init::InitArgs),

    /// Validate a configuration file and show the derived parameters
    CheckConfig(check::CheckArgs),

    /// Run a deterministic in-memory network
    Simulate(simulate::SimulateArgs),

    /// Show version information
    Version,
}

/// Execute the CLI with parsed arguments
pub fn run_cli(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Init(args) => init::execute(args, cli.output),
        Commands::CheckConfig(args) => check::execute(args, cli.output),
        Commands::Simulate(args) => simulate::execute(args, cli.output),
        Commands::Version => execute_version(cli.output),
    }
}

/// Execute the version command
fn execute_version(output_format: OutputFormat) -> CliResult<()> {
    let version_info = VersionInfo::new();

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&version_info)?);
        }
        OutputFormat::Text => {
            println!("Cadence CLI");
            println!("  Version:     {}", version_info.version);
            println!("  Git Commit:  {}", version_info.git_commit);
            println!("  Rust:        {}", version_info.rust_version);
            println!("  Target:      {}", version_info.target);
        }
    }

    Ok(())
}

/// Version information structure
#[derive(Debug, Serialize)]
struct VersionInfo {
    version: String,
    git_commit: String,
    rust_version: String,
    target: String,
}

impl VersionInfo {
    fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            git_commit: option_env!("GIT_COMMIT").unwrap_or("unknown").to_string(),
            rust_version: option_env!("RUSTC_VERSION")
                .unwrap_or(env!("CARGO_PKG_RUST_VERSION"))
                .to_string(),
            target: std::env::consts::ARCH.to_string() + "-" + std::env::consts::OS,
        }
    }
}
