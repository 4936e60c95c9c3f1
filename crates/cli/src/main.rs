//! Cadence CLI - Main entry point

use anyhow::{anyhow, Result};
use cadence_cli::{run_cli, Cli, LogFormat};
use clap::Parser;
use std::process;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(2);
    }

    if let Err(e) = run_cli(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Initialize tracing. `RUST_LOG` overrides the verbosity flags.
///
/// Logs go to stderr so JSON command output on stdout stays parseable.
fn init_logging(cli: &Cli) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cli.log_format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(cli.verbose >= 2).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
    }
    .map_err(|e| anyhow!(e))
}
