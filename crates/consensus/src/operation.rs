//! Mutating operations as data.
//!
//! The ordering layer delivers operations in its agreed total order; each one
//! maps onto a [`crate::ConsensusCore`] method through
//! [`crate::ConsensusCore::apply`].

use cadence_crypto::Signature;
use cadence_types::{Address, BasisPoints, BlockNumber, Role, Stake, Timestamp, H256};
use serde::{Deserialize, Serialize};

use crate::attestation::{DoubleSignEvidence, SubmitOutcome};
use crate::types::BlockContext;

/// One operation in the total order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Move to a new block position
    AdvanceBlock {
        /// Block number
        number: BlockNumber,
        /// Block timestamp
        timestamp: Timestamp,
    },
    /// Join a registry
    Register {
        /// Submitting identity
        caller: Address,
        /// Registry
        role: Role,
        /// Identity to register
        identity: Address,
        /// Stake to move into escrow
        stake: Stake,
        /// Endpoint metadata
        endpoint: String,
    },
    /// Leave a registry
    Deactivate {
        /// Submitting identity
        caller: Address,
        /// Registry
        role: Role,
        /// Identity to deactivate
        identity: Address,
    },
    /// Add or withdraw stake
    UpdateStake {
        /// Submitting identity
        caller: Address,
        /// Registry
        role: Role,
        /// Participant
        identity: Address,
        /// Signed change
        delta: i128,
    },
    /// Report a participant's uptime
    RecordUptime {
        /// Submitting manager
        caller: Address,
        /// Registry
        role: Role,
        /// Participant
        identity: Address,
        /// Uptime in basis points
        uptime_bps: BasisPoints,
    },
    /// Leave jail
    Unjail {
        /// Submitting identity
        caller: Address,
        /// Registry
        role: Role,
        /// Participant
        identity: Address,
    },
    /// The leader produced a block
    RecordBlockProduced {
        /// Producer
        producer: Address,
        /// Height
        block_number: BlockNumber,
        /// Hash
        block_hash: H256,
    },
    /// Rotate if the interval is complete
    CheckRotation,
    /// Time out an inactive leader
    CheckTimeout,
    /// Report an invalid block
    ReportInvalidBlock {
        /// Reporter
        reporter: Address,
        /// Offending sequencer
        sequencer: Address,
        /// Height of the block
        block_number: BlockNumber,
    },
    /// Force a rotation
    AdminRotate {
        /// Submitting manager
        caller: Address,
    },
    /// Elect the next validator proposer
    ElectProposer,
    /// Attest a block
    SubmitAttestation {
        /// Validator
        validator: Address,
        /// Height
        block_number: BlockNumber,
        /// Hash
        block_hash: H256,
        /// Signature over the attestation bytes
        signature: Signature,
    },
    /// Submit double-sign evidence
    ReportDoubleSign(DoubleSignEvidence),
    /// Close the epoch
    AdvanceEpoch,
    /// Ask for forced inclusion of a transaction
    RequestInclusion {
        /// Requester
        requester: Address,
        /// Transaction reference
        tx_ref: H256,
    },
    /// Confirm forced inclusion
    MarkIncluded {
        /// Oracle
        caller: Address,
        /// Transaction reference
        tx_ref: H256,
    },
    /// Charge the leader for expired requests
    CheckInclusionTimeouts,
}

impl Operation {
    /// Operation name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::AdvanceBlock { .. } => "advance_block",
            Operation::Register { .. } => "register",
            Operation::Deactivate { .. } => "deactivate",
            Operation::UpdateStake { .. } => "update_stake",
            Operation::RecordUptime { .. } => "record_uptime",
            Operation::Unjail { .. } => "unjail",
            Operation::RecordBlockProduced { .. } => "record_block_produced",
            Operation::CheckRotation => "check_rotation",
            Operation::CheckTimeout => "check_timeout",
            Operation::ReportInvalidBlock { .. } => "report_invalid_block",
            Operation::AdminRotate { .. } => "admin_rotate",
            Operation::ElectProposer => "elect_proposer",
            Operation::SubmitAttestation { .. } => "submit_attestation",
            Operation::ReportDoubleSign(_) => "report_double_sign",
            Operation::AdvanceEpoch => "advance_epoch",
            Operation::RequestInclusion { .. } => "request_inclusion",
            Operation::MarkIncluded { .. } => "mark_included",
            Operation::CheckInclusionTimeouts => "check_inclusion_timeouts",
        }
    }

    /// `AdvanceBlock` for a context.
    pub fn advance_block(ctx: BlockContext) -> Self {
        Operation::AdvanceBlock {
            number: ctx.number,
            timestamp: ctx.timestamp,
        }
    }
}

/// What a committed operation returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutput {
    /// Nothing beyond events
    Done,
    /// Whether a scheduled rotation happened
    Rotated(bool),
    /// Elected proposer
    Proposer(Address),
    /// Attestation outcome
    Attestation(SubmitOutcome),
    /// Number of the newly opened epoch
    Epoch(u64),
    /// References expired by an inclusion check
    Expired(Vec<H256>),
}
