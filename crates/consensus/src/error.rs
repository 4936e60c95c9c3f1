//! Error taxonomy for the consensus core.
//!
//! Every operation either commits all of its effects or returns one of these
//! errors and leaves state, ledger balances and the event outbox untouched.

use cadence_types::{Address, BasisPoints, BlockNumber, Role, Stake, Timestamp, H256};
use thiserror::Error;

use crate::force_inclusion::InclusionStatus;
use crate::ledger::LedgerError;

/// Errors returned by consensus operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    /// The identity is not registered in the role's registry
    #[error("{role} {identity} not found")]
    NotFound {
        /// Registry that was searched
        role: Role,
        /// Identity looked up
        identity: Address,
    },

    /// The identity already exists in the role's registry
    #[error("{role} {identity} already registered")]
    AlreadyRegistered {
        /// Registry written to
        role: Role,
        /// Duplicate identity
        identity: Address,
    },

    /// The participant exists but is deactivated
    #[error("{role} {identity} is not active")]
    NotActive {
        /// Participant role
        role: Role,
        /// Participant identity
        identity: Address,
    },

    /// The participant is jailed
    #[error("{identity} is jailed until block {until}")]
    Jailed {
        /// Participant identity
        identity: Address,
        /// Block at which the jail term ends
        until: BlockNumber,
    },

    /// Stake or balance is below what the operation requires
    #[error("insufficient stake: required {required}, available {available}")]
    InsufficientStake {
        /// Amount required
        required: Stake,
        /// Amount available
        available: Stake,
    },

    /// Voting power is zero or total power would exceed the ceiling
    #[error("invalid voting power: {0}")]
    InvalidVotingPower(String),

    /// Caller may not perform this action
    #[error("{caller} is not authorized to {action}")]
    Unauthorized {
        /// Caller identity
        caller: Address,
        /// Action attempted
        action: &'static str,
    },

    /// A signature does not recover to the claimed signer
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// No participant is eligible to lead
    #[error("no eligible leader")]
    NoEligibleLeader,

    /// Leader timeout window has not elapsed
    #[error("timeout not reached: current block {current}, deadline {deadline}")]
    TimeoutNotReached {
        /// Current block
        current: BlockNumber,
        /// First block at which the timeout fires
        deadline: BlockNumber,
    },

    /// No force-inclusion request exists for this transaction
    #[error("no force inclusion request for {0}")]
    RequestNotFound(H256),

    /// The force-inclusion request was already resolved
    #[error("force inclusion request {tx_ref} is {status}, not pending")]
    RequestNotPending {
        /// Transaction reference
        tx_ref: H256,
        /// Status it was resolved with
        status: InclusionStatus,
    },

    /// A force-inclusion request for this transaction is already pending
    #[error("force inclusion already requested for {0}")]
    AlreadyRequested(H256),

    /// The jail term has not elapsed
    #[error("{identity} is still jailed until block {until}")]
    StillJailed {
        /// Participant identity
        identity: Address,
        /// Block at which the jail term ends
        until: BlockNumber,
    },

    /// The current epoch's duration has not elapsed
    #[error("epoch {epoch} has not ended: ends at {ends_at}, now {now}")]
    EpochNotEnded {
        /// Current epoch number
        epoch: u64,
        /// Earliest timestamp at which it may advance
        ends_at: Timestamp,
        /// Current timestamp
        now: Timestamp,
    },

    /// Internal bookkeeping disagrees with the custody ledger
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Permanent participants cannot be deactivated
    #[error("{0} is permanent and cannot be removed")]
    CannotRemovePermanent(Address),

    /// Unjail requested for a participant that is not jailed
    #[error("{0} is not jailed")]
    NotJailed(Address),

    /// Double-sign evidence was already acted on
    #[error("evidence {0} already processed")]
    EvidenceAlreadyProcessed(H256),

    /// Uptime above 100%
    #[error("invalid uptime {0} bps: must be <= 10000")]
    InvalidUptime(BasisPoints),

    /// Attestation refers to a block outside the acceptance window
    #[error("attestation for block {block_number} too old: current {current}, max age {max_age}")]
    AttestationTooOld {
        /// Attested block
        block_number: BlockNumber,
        /// Current block
        current: BlockNumber,
        /// Acceptance window
        max_age: u64,
    },

    /// Block context moved backwards
    #[error("block context regression: at block {current_block} (t={current_time}), got block {block} (t={time})")]
    BlockRegression {
        /// Current block number
        current_block: BlockNumber,
        /// Current timestamp
        current_time: Timestamp,
        /// Offered block number
        block: BlockNumber,
        /// Offered timestamp
        time: Timestamp,
    },

    /// The custody ledger refused a movement
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl ConsensusError {
    /// Whether this error signals corrupted bookkeeping rather than a rejected request.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, ConsensusError::InvariantViolation(_))
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
