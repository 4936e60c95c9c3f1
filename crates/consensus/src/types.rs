//! Core records shared by the consensus components.

use cadence_types::{
    Address, BasisPoints, BlockNumber, Role, Stake, Timestamp, VotingPower, BPS_DENOMINATOR,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Domain separators for signed and hashed consensus payloads
pub mod domains {
    /// Domain separator for block attestations
    pub const ATTESTATION: &[u8] = b"CADENCE_ATTESTATION_V1";
    /// Domain separator for double-sign evidence hashes
    pub const EVIDENCE: &[u8] = b"CADENCE_EVIDENCE_V1";
    /// Domain separator for epoch validator-set commitments
    pub const VALIDATOR_SET: &[u8] = b"CADENCE_VALIDATOR_SET_V1";
}

/// Position in the externally supplied total order.
///
/// The core never reads a clock; the ordering layer advances this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockContext {
    /// Current block number
    pub number: BlockNumber,
    /// Timestamp of the current block (seconds)
    pub timestamp: Timestamp,
}

impl BlockContext {
    /// Create a new block context
    pub const fn new(number: BlockNumber, timestamp: Timestamp) -> Self {
        Self { number, timestamp }
    }
}

impl fmt::Display for BlockContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.number, self.timestamp)
    }
}

/// Lifecycle state of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Eligible for rotation or election
    Active,
    /// Genesis bootstrap entity; eligible and never deactivated
    Permanent,
    /// Removed from the active set until the jail term ends and it unjails
    Jailed,
    /// Left voluntarily or fell below the stake minimum; history retained
    Deactivated,
}

impl ParticipantStatus {
    /// Whether the status belongs in the active set.
    pub fn is_eligible(&self) -> bool {
        matches!(self, ParticipantStatus::Active | ParticipantStatus::Permanent)
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticipantStatus::Active => write!(f, "active"),
            ParticipantStatus::Permanent => write!(f, "permanent"),
            ParticipantStatus::Jailed => write!(f, "jailed"),
            ParticipantStatus::Deactivated => write!(f, "deactivated"),
        }
    }
}

/// A registered sequencer or validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Identity
    pub address: Address,
    /// Registry this participant belongs to
    pub role: Role,
    /// Stake held in escrow on its behalf
    pub stake: Stake,
    /// Voting power derived from stake (validators only)
    pub voting_power: VotingPower,
    /// Endpoint metadata supplied at registration
    pub endpoint: String,
    /// Block of registration
    pub registered_at: BlockNumber,
    /// Timestamp of registration
    pub registered_time: Timestamp,
    /// Lifecycle state
    pub status: ParticipantStatus,
    /// Genesis bootstrap flag; survives jailing
    pub permanent: bool,
    /// Block at which the current or last jail term ends
    pub jailed_until: BlockNumber,
    /// Blocks produced while leading
    pub blocks_produced: u64,
    /// Blocks missed while leading
    pub blocks_missed: u64,
    /// Cumulative leader timeouts since the last unjail
    pub timeout_count: u32,
    /// Number of slashes applied
    pub slash_count: u32,
    /// Total amount slashed
    pub total_slashed: Stake,
    /// Last reported uptime in basis points
    pub uptime_bps: BasisPoints,
}

impl Participant {
    /// Creates an active (or permanent) participant.
    pub fn new(
        address: Address,
        role: Role,
        stake: Stake,
        endpoint: impl Into<String>,
        at: BlockContext,
        permanent: bool,
    ) -> Self {
        Self {
            address,
            role,
            stake,
            voting_power: 0,
            endpoint: endpoint.into(),
            registered_at: at.number,
            registered_time: at.timestamp,
            status: if permanent {
                ParticipantStatus::Permanent
            } else {
                ParticipantStatus::Active
            },
            permanent,
            jailed_until: 0,
            blocks_produced: 0,
            blocks_missed: 0,
            timeout_count: 0,
            slash_count: 0,
            total_slashed: 0,
            uptime_bps: BPS_DENOMINATOR,
        }
    }

    /// In the active set.
    pub fn is_eligible(&self) -> bool {
        self.status.is_eligible()
    }

    /// Currently jailed.
    pub fn is_jailed(&self) -> bool {
        self.status == ParticipantStatus::Jailed
    }

    /// Status an unjailed participant returns to.
    pub fn restored_status(&self) -> ParticipantStatus {
        if self.permanent {
            ParticipantStatus::Permanent
        } else {
            ParticipantStatus::Active
        }
    }

    /// Produced blocks over produced plus missed, in basis points.
    pub fn production_rate_bps(&self) -> BasisPoints {
        let total = self.blocks_produced + self.blocks_missed;
        if total == 0 {
            return BPS_DENOMINATOR;
        }
        (u128::from(self.blocks_produced) * u128::from(BPS_DENOMINATOR) / u128::from(total))
            as BasisPoints
    }
}
