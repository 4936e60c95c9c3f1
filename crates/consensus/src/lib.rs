//! # Cadence Consensus
//!
//! Rotation-and-attestation consensus core for a rollup.
//!
//! Two participant roles share one registry design:
//!
//! - **Sequencers** take turns holding the leader slot and producing blocks
//!   (round-robin, liveness layer).
//! - **Validators** are elected proposer in proportion to their voting power
//!   and attest to blocks; a block is final once attestations carry more than
//!   two thirds of the total power (safety layer).
//!
//! Misbehavior is punished by slashing stake into the treasury and jailing.
//! Epochs snapshot the active sets on a wall-clock schedule, and the
//! force-inclusion queue charges a censoring leader. Committed state can be
//! mirrored into Prometheus gauges and counters through [`ConsensusMetrics`].
//!
//! ## Execution Model
//!
//! ```text
//!   ordering layer ──Operation──▶ ConsensusCore::apply
//!                                    │
//!                                    ├── stage on a copy of the state
//!                                    ├── settle stake with the StakeLedger
//!                                    ├── check escrow ≥ total stake
//!                                    └── commit state, buffer ConsensusEvents
//! ```
//!
//! The core never reads a clock. Timeouts, rotations, epochs and inclusion
//! deadlines are explicit operations evaluated against the current
//! [`BlockContext`], which only moves forward.
//!
//! ## Example
//!
//! ```rust
//! use cadence_consensus::{BlockContext, ConsensusCore, ConsensusParams, InMemoryLedger, StakeLedger};
//! use cadence_types::{Address, Role};
//!
//! let seq = Address::from_low_u64_be(1);
//! let params = ConsensusParams {
//!     min_sequencer_stake: 1_000,
//!     ..ConsensusParams::default()
//! };
//! let ledger = InMemoryLedger::with_balances([(seq, 5_000)]);
//! let mut core = ConsensusCore::new(params, ledger, BlockContext::new(1, 0));
//!
//! core.register(&seq, Role::Sequencer, &seq, 1_000, "http://127.0.0.1:8545").unwrap();
//! assert_eq!(core.current_leader(), Some(seq));
//! assert_eq!(core.ledger().balance_of(&seq), 4_000);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod attestation;
pub mod election;
pub mod engine;
pub mod epoch;
pub mod error;
pub mod events;
pub mod force_inclusion;
pub mod ledger;
pub mod metrics;
pub mod operation;
pub mod params;
pub mod registry;
pub mod rotation;
pub mod signer;
pub mod slashing;
pub mod types;

pub use attestation::{
    attestation_signing_bytes, Attestation, AttestationLedger, BlockAttestations,
    DoubleSignEvidence, SubmitOutcome,
};
pub use election::{quorum_threshold, WeightedElection, MAX_TOTAL_VOTING_POWER};
pub use engine::ConsensusCore;
pub use epoch::{compute_validator_set_hash, EpochManager, EpochRecord};
pub use error::{ConsensusError, ConsensusResult};
pub use events::ConsensusEvent;
pub use force_inclusion::{ForceInclusionQueue, ForceInclusionRequest, InclusionStatus};
pub use ledger::{InMemoryLedger, LedgerError, StakeLedger};
pub use metrics::{ConsensusMetrics, MetricsSnapshot};
pub use operation::{Operation, OperationOutput};
pub use params::{ConsensusParams, Genesis, GenesisParticipant};
pub use registry::{ActiveSet, ParticipantRegistry, Removal, SelectionPolicy};
pub use rotation::{RotationEndReason, RotationEngine, RotationRecord, RoundRobin};
pub use signer::{EcdsaRecovery, SignerRecovery};
pub use slashing::{apply_bps, JailOutcome, Offense, PenaltyTable, SlashRecord, SlashingEngine};
pub use types::{domains, BlockContext, Participant, ParticipantStatus};
