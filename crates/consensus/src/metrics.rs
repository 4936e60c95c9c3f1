//! Prometheus metrics for consensus monitoring.
//!
//! [`ConsensusMetrics`] is registered with a caller-owned [`Registry`] and
//! attached to a core with [`ConsensusCore::attach_metrics`]. Counters advance
//! from the events of each committed operation; gauges are reset from the
//! committed state. Rejected operations touch neither.
//!
//! [`ConsensusCore::attach_metrics`]: crate::ConsensusCore::attach_metrics

use prometheus::{IntCounter, IntGauge, Opts, Registry};

use crate::events::ConsensusEvent;
use crate::rotation::RotationEndReason;

const NAMESPACE: &str = "cadence";
const SUBSYSTEM: &str = "consensus";

/// Committed-state values mirrored into gauges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Current block number
    pub block: u64,
    /// Open epoch
    pub epoch: u64,
    /// Open rotation, if a leader holds the slot
    pub rotation: Option<u64>,
    /// Sequencers eligible to lead
    pub active_sequencers: usize,
    /// Validators eligible to attest
    pub active_validators: usize,
    /// Summed power of active validators
    pub total_voting_power: u64,
    /// Finality threshold
    pub quorum_threshold: u64,
    /// Production-derived uptime of the current leader
    pub leader_uptime_bps: Option<u64>,
    /// Force-inclusion requests awaiting inclusion
    pub pending_inclusions: usize,
}

/// Consensus metrics for observability
#[derive(Debug, Clone)]
pub struct ConsensusMetrics {
    /// Current block number
    pub current_block: IntGauge,
    /// Current epoch number
    pub current_epoch: IntGauge,
    /// Current rotation number, -1 with no leader
    pub current_rotation: IntGauge,
    /// Number of active sequencers
    pub active_sequencers: IntGauge,
    /// Number of active validators
    pub active_validators: IntGauge,
    /// Total voting power
    pub total_voting_power: IntGauge,
    /// BFT threshold
    pub bft_threshold: IntGauge,
    /// Uptime of the current leader in basis points, -1 with no leader
    pub leader_uptime: IntGauge,
    /// Pending force-inclusion requests
    pub pending_inclusions: IntGauge,
    /// Blocks produced by leaders
    pub blocks_produced: IntCounter,
    /// Blocks missed by timed-out leaders
    pub blocks_missed: IntCounter,
    /// Attestations counted toward an aggregate
    pub attestations_accepted: IntCounter,
    /// Block hashes that reached quorum
    pub blocks_finalized: IntCounter,
    /// Leader timeouts
    pub timeouts_detected: IntCounter,
    /// Rotations that ended other than on schedule
    pub forced_rotations: IntCounter,
    /// Penalties applied
    pub slashes: IntCounter,
    /// Jail terms started or extended
    pub jailings: IntCounter,
    /// Censorship charges against a leader
    pub censorship_detected: IntCounter,
}

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace(NAMESPACE).subsystem(SUBSYSTEM)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, prometheus::Error> {
    let gauge = IntGauge::with_opts(opts(name, help))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let counter = IntCounter::with_opts(opts(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl ConsensusMetrics {
    /// Create new metrics and register with registry
    ///
    /// # Errors
    ///
    /// Returns error if metrics registration fails, e.g. when the registry
    /// already holds consensus metrics.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            current_block: gauge(registry, "current_block", "Current block number")?,
            current_epoch: gauge(registry, "current_epoch", "Current epoch number")?,
            current_rotation: gauge(registry, "current_rotation", "Current rotation number")?,
            active_sequencers: gauge(registry, "active_sequencers", "Number of active sequencers")?,
            active_validators: gauge(registry, "active_validators", "Number of active validators")?,
            total_voting_power: gauge(registry, "total_voting_power", "Total voting power")?,
            bft_threshold: gauge(registry, "bft_threshold", "BFT threshold (2/3+1)")?,
            leader_uptime: gauge(registry, "leader_uptime_bps", "Current leader uptime (basis points)")?,
            pending_inclusions: gauge(registry, "pending_inclusions", "Pending force inclusion requests")?,
            blocks_produced: counter(registry, "blocks_produced_total", "Total blocks produced")?,
            blocks_missed: counter(registry, "blocks_missed_total", "Total blocks missed by timed out leaders")?,
            attestations_accepted: counter(registry, "attestations_accepted_total", "Total attestations accepted")?,
            blocks_finalized: counter(registry, "blocks_finalized_total", "Total blocks finalized")?,
            timeouts_detected: counter(registry, "timeouts_detected_total", "Total leader timeouts")?,
            forced_rotations: counter(registry, "forced_rotations_total", "Total unscheduled rotations")?,
            slashes: counter(registry, "slashes_total", "Total penalties applied")?,
            jailings: counter(registry, "jailings_total", "Total jail terms started or extended")?,
            censorship_detected: counter(registry, "censorship_detected_total", "Total censorship charges")?,
        })
    }

    /// Advances counters for the events of one committed operation.
    pub fn record_events(&self, events: &[ConsensusEvent]) {
        for event in events {
            match event {
                ConsensusEvent::BlockProduced { .. } => self.blocks_produced.inc(),
                ConsensusEvent::LeaderTimedOut { missed_blocks, .. } => {
                    self.timeouts_detected.inc();
                    self.blocks_missed.inc_by(*missed_blocks);
                }
                ConsensusEvent::RotationCompleted { reason, .. } if *reason != RotationEndReason::Scheduled => {
                    self.forced_rotations.inc()
                }
                ConsensusEvent::AttestationAccepted { .. } => self.attestations_accepted.inc(),
                ConsensusEvent::BlockFinalized { .. } => self.blocks_finalized.inc(),
                ConsensusEvent::Slashed { .. } => self.slashes.inc(),
                ConsensusEvent::Jailed { .. } => self.jailings.inc(),
                ConsensusEvent::CensorshipDetected { .. } => self.censorship_detected.inc(),
                _ => {}
            }
        }
    }

    /// Resets gauges from committed state.
    pub fn set_state(&self, snapshot: &MetricsSnapshot) {
        self.current_block.set(clamp(snapshot.block));
        self.current_epoch.set(clamp(snapshot.epoch));
        self.current_rotation.set(snapshot.rotation.map_or(-1, clamp));
        self.active_sequencers.set(clamp(snapshot.active_sequencers as u64));
        self.active_validators.set(clamp(snapshot.active_validators as u64));
        self.total_voting_power.set(clamp(snapshot.total_voting_power));
        self.bft_threshold.set(clamp(snapshot.quorum_threshold));
        self.leader_uptime.set(snapshot.leader_uptime_bps.map_or(-1, clamp));
        self.pending_inclusions.set(clamp(snapshot.pending_inclusions as u64));
    }
}
