//! Deterministic network simulation.
//!
//! `cadence simulate` drives a [`ConsensusCore`] over an in-memory ledger
//! with keys derived from a seed, so the same arguments always produce the
//! same event stream. Each simulated block:
//!
//! ```text
//!   advance block ─▶ leader produces? ─┬─ yes ─▶ record block ─▶ check rotation ─▶ attest ─┐
//!                                      └─ no ──▶ check timeout ───────────────────────────┤
//!                                                                                        ▼
//!                                                       elect proposer ─▶ advance epoch if due
//! ```
//!
//! One sequencer can be marked offline to exercise timeouts, slashing and
//! jailing. With `--metrics` the run prints the final consensus metrics in the
//! Prometheus text format instead of its events.

use cadence_config::Config;
use cadence_consensus::{
    BlockContext, ConsensusCore, ConsensusError, ConsensusEvent, ConsensusMetrics, ConsensusParams,
    EcdsaRecovery, Genesis, GenesisParticipant, InMemoryLedger, SubmitOutcome,
};
use cadence_crypto::PrivateKey;
use cadence_types::{Address, Role, Stake, H256};
use clap::Parser;
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::utils::{format_amount, print_info, CliError, CliResult, OutputFormat};

/// Arguments for the simulate command
#[derive(Parser, Debug, Clone)]
pub struct SimulateArgs {
    /// Configuration file (defaults are used when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of blocks to simulate
    #[arg(long, default_value_t = 300)]
    pub blocks: u64,

    /// Sequencers to register in addition to the configured genesis set
    #[arg(long, default_value_t = 3)]
    pub sequencers: usize,

    /// Validators to register in addition to the configured genesis set
    #[arg(long, default_value_t = 4)]
    pub validators: usize,

    /// Index of a simulated sequencer that never produces blocks
    #[arg(long)]
    pub offline: Option<usize>,

    /// Seconds between blocks
    #[arg(long, default_value_t = 2)]
    pub block_time: u64,

    /// Seed for deriving participant keys
    #[arg(long, default_value = "cadence")]
    pub seed: String,

    /// Print only the summary
    #[arg(long)]
    pub summary_only: bool,

    /// Print only the final metrics, in the Prometheus text format
    #[arg(long, conflicts_with = "summary_only")]
    pub metrics: bool,
}

impl Default for SimulateArgs {
    fn default() -> Self {
        Self {
            config: None,
            blocks: 300,
            sequencers: 3,
            validators: 4,
            offline: None,
            block_time: 2,
            seed: "cadence".to_string(),
            summary_only: false,
            metrics: false,
        }
    }
}

/// An event together with the block it was emitted at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimedEvent {
    /// Block number
    pub block: u64,
    /// The event
    pub event: ConsensusEvent,
}

/// End-of-run totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationSummary {
    /// Blocks simulated
    pub blocks: u64,
    /// Blocks recorded as produced
    pub blocks_produced: u64,
    /// Rotations opened, including the current one
    pub rotations: usize,
    /// Leader timeouts
    pub timeouts: usize,
    /// Slash records
    pub slashes: usize,
    /// Stake sent to the treasury
    pub total_slashed: Stake,
    /// Blocks that reached quorum
    pub finalized_blocks: usize,
    /// Current epoch number
    pub epoch: u64,
    /// Leader when the run ended
    pub leader: Option<Address>,
    /// Active voting power when the run ended
    pub total_voting_power: u64,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Totals
    pub summary: SimulationSummary,
    /// Every event in emission order
    pub events: Vec<TimedEvent>,
    /// Final metrics in the Prometheus text format
    #[serde(skip)]
    pub metrics: String,
}

fn derive_keys(seed: &str, role: Role, count: usize) -> Vec<PrivateKey> {
    (0..count)
        .map(|i| PrivateKey::from_seed(format!("{seed}/{role}/{i}").as_bytes()))
        .collect()
}

fn block_hash(seed: &str, number: u64) -> H256 {
    H256::keccak256_concat(&[seed.as_bytes(), b"/block/", &number.to_be_bytes()])
}

/// Run a simulation against `config`.
pub fn run(config: &Config, args: &SimulateArgs) -> CliResult<SimulationReport> {
    let params = ConsensusParams::try_from(config)?;
    let genesis = Genesis::try_from(&config.genesis)?;

    let configured_sequencers = genesis
        .participants
        .iter()
        .filter(|p| p.role == Role::Sequencer)
        .count();
    if configured_sequencers + args.sequencers == 0 {
        return Err(CliError::InvalidArgument(
            "at least one sequencer is required".to_string(),
        ));
    }
    if let Some(index) = args.offline {
        if index >= args.sequencers {
            return Err(CliError::InvalidArgument(format!(
                "--offline {} is out of range for {} simulated sequencer(s)",
                index, args.sequencers
            )));
        }
    }

    let sequencer_keys = derive_keys(&args.seed, Role::Sequencer, args.sequencers);
    let validator_keys = derive_keys(&args.seed, Role::Validator, args.validators);
    let offline = args.offline.map(|i| sequencer_keys[i].address());

    let mut ledger = InMemoryLedger::with_balances(genesis.balances.iter().copied());
    let mut participants = genesis.participants.clone();
    for (i, key) in sequencer_keys.iter().enumerate() {
        let stake = params.min_sequencer_stake;
        ledger.credit(key.address(), stake);
        participants.push(GenesisParticipant {
            address: key.address(),
            role: Role::Sequencer,
            stake,
            endpoint: format!("sim://sequencer/{i}"),
            permanent: false,
        });
    }
    let unit = params.min_validator_stake.max(params.stake_per_power);
    for (i, key) in validator_keys.iter().enumerate() {
        let stake = unit.saturating_mul(i as u128 + 1);
        ledger.credit(key.address(), stake);
        participants.push(GenesisParticipant {
            address: key.address(),
            role: Role::Validator,
            stake,
            endpoint: format!("sim://validator/{i}"),
            permanent: false,
        });
    }

    let mut core = ConsensusCore::genesis(
        params,
        ledger,
        EcdsaRecovery,
        BlockContext::default(),
        &participants,
    )?;
    let registry = Registry::new();
    core.attach_metrics(ConsensusMetrics::new(&registry)?);
    info!(
        blocks = args.blocks,
        sequencers = core.sequencers().len(),
        validators = core.validators().len(),
        offline = ?offline,
        "Simulation started"
    );

    let mut events: Vec<TimedEvent> = core
        .drain_events()
        .into_iter()
        .map(|event| TimedEvent { block: 0, event })
        .collect();
    let mut produced = 0u64;

    for number in 1..=args.blocks {
        let timestamp = number.saturating_mul(args.block_time);
        core.advance_block(BlockContext::new(number, timestamp))?;
        let hash = block_hash(&args.seed, number);

        match core.current_leader() {
            Some(leader) if Some(leader) != offline => {
                core.record_block_produced(&leader, number, hash)?;
                produced += 1;
                core.check_rotation()?;
                attest(&mut core, &validator_keys, number, hash)?;
            }
            Some(_) => match core.check_timeout() {
                Ok(()) | Err(ConsensusError::TimeoutNotReached { .. }) => {}
                Err(err) => return Err(err.into()),
            },
            None => debug!(block = number, "No leader; block skipped"),
        }

        if core.total_voting_power() > 0 {
            core.elect_proposer()?;
        }
        match core.advance_epoch() {
            Ok(_) | Err(ConsensusError::EpochNotEnded { .. }) => {}
            Err(err) => return Err(err.into()),
        }

        events.extend(
            core.drain_events()
                .into_iter()
                .map(|event| TimedEvent { block: number, event }),
        );
    }

    let count = |pred: fn(&ConsensusEvent) -> bool| events.iter().filter(|e| pred(&e.event)).count();
    let summary = SimulationSummary {
        blocks: args.blocks,
        blocks_produced: produced,
        rotations: core.rotation_history().count(),
        timeouts: count(|e| matches!(e, ConsensusEvent::LeaderTimedOut { .. })),
        slashes: core.slash_history().len(),
        total_slashed: core.slash_history().iter().map(|r| r.amount).sum(),
        finalized_blocks: count(|e| matches!(e, ConsensusEvent::BlockFinalized { .. })),
        epoch: core.current_epoch().number,
        leader: core.current_leader(),
        total_voting_power: core.total_voting_power(),
    };
    info!(
        produced = summary.blocks_produced,
        rotations = summary.rotations,
        slashes = summary.slashes,
        "Simulation finished"
    );

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    let metrics = String::from_utf8_lossy(&buffer).into_owned();

    Ok(SimulationReport {
        summary,
        events,
        metrics,
    })
}

/// Every active simulated validator attests to `hash`.
fn attest(
    core: &mut ConsensusCore<InMemoryLedger>,
    keys: &[PrivateKey],
    number: u64,
    hash: H256,
) -> CliResult<()> {
    let signing_bytes = core.attestation_signing_bytes(number, &hash);
    for key in keys {
        let validator = key.address();
        if !core.validators().is_active(&validator) {
            continue;
        }
        let signature = key.sign(&signing_bytes)?;
        if let SubmitOutcome::Accepted { finalized: true, .. } =
            core.submit_attestation(&validator, number, hash, signature)?
        {
            debug!(block = number, "Block finalized");
        }
    }
    Ok(())
}

/// Execute the simulate command
pub fn execute(args: SimulateArgs, output_format: OutputFormat) -> CliResult<()> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => {
            print_info("No --config given; using built-in defaults");
            Config::default()
        }
    };
    let report = run(&config, &args)?;

    if args.metrics {
        print!("{}", report.metrics);
        return Ok(());
    }

    match output_format {
        OutputFormat::Json => {
            if args.summary_only {
                println!("{}", serde_json::to_string_pretty(&report.summary)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        OutputFormat::Text => {
            if !args.summary_only {
                for timed in &report.events {
                    println!("#{:<6} {}", timed.block, timed.event);
                }
                println!();
            }
            let s = &report.summary;
            println!("Simulation summary");
            println!("  Blocks:            {} ({} produced)", s.blocks, s.blocks_produced);
            println!("  Rotations:         {}", s.rotations);
            println!("  Timeouts:          {}", s.timeouts);
            println!("  Slashes:           {} ({} slashed)", s.slashes, format_amount(s.total_slashed));
            println!("  Finalized blocks:  {}", s.finalized_blocks);
            println!("  Epoch:             {}", s.epoch);
            match s.leader {
                Some(leader) => println!("  Leader:            {}", leader),
                None => println!("  Leader:            none"),
            }
            println!("  Voting power:      {}", s.total_voting_power);
        }
    }

    Ok(())
}
