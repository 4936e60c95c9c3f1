//! Events emitted by committed operations.
//!
//! Events are buffered in an outbox and handed out by
//! [`crate::ConsensusCore::drain_events`]. A rejected operation emits nothing.

use cadence_types::{Address, BasisPoints, BlockNumber, Role, Stake, Timestamp, VotingPower, H256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rotation::RotationEndReason;
use crate::slashing::Offense;

/// Observable consensus state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConsensusEvent {
    /// A participant joined a registry
    ParticipantRegistered {
        /// Role registered for
        role: Role,
        /// Identity
        identity: Address,
        /// Stake moved into escrow
        stake: Stake,
        /// Derived voting power
        voting_power: VotingPower,
        /// Genesis bootstrap participant
        permanent: bool,
    },
    /// A participant left voluntarily or fell below the minimum
    ParticipantDeactivated {
        /// Role
        role: Role,
        /// Identity
        identity: Address,
        /// Stake released back to the identity
        released: Stake,
    },
    /// Stake changed without leaving the registry
    StakeUpdated {
        /// Role
        role: Role,
        /// Identity
        identity: Address,
        /// Previous stake
        old_stake: Stake,
        /// New stake
        new_stake: Stake,
    },
    /// An uptime report was recorded
    UptimeRecorded {
        /// Role
        role: Role,
        /// Identity
        identity: Address,
        /// Reported uptime
        uptime_bps: BasisPoints,
    },
    /// A sequencer took the leader slot
    LeaderAssigned {
        /// Tenure sequence number
        rotation: u64,
        /// New leader
        leader: Address,
        /// Block at which the tenure starts
        block: BlockNumber,
    },
    /// A tenure ended
    RotationCompleted {
        /// Tenure sequence number
        rotation: u64,
        /// Outgoing leader
        leader: Address,
        /// Blocks produced
        blocks_produced: u64,
        /// Why it ended
        reason: RotationEndReason,
    },
    /// The leader produced a block
    BlockProduced {
        /// Producer
        producer: Address,
        /// Height
        block_number: BlockNumber,
        /// Hash
        block_hash: H256,
    },
    /// The leader missed its timeout window
    LeaderTimedOut {
        /// Leader
        leader: Address,
        /// Blocks missed since its last activity
        missed_blocks: u64,
        /// Cumulative timeouts
        timeout_count: u32,
    },
    /// A sequencer was reported for an invalid block
    InvalidBlockReported {
        /// Reporter
        reporter: Address,
        /// Offending sequencer
        sequencer: Address,
        /// Height of the block
        block_number: BlockNumber,
    },
    /// A validator was elected proposer
    ProposerElected {
        /// Proposer
        proposer: Address,
        /// Election count
        election: u64,
    },
    /// An attestation was counted
    AttestationAccepted {
        /// Validator
        validator: Address,
        /// Height
        block_number: BlockNumber,
        /// Hash
        block_hash: H256,
        /// Aggregate after counting
        aggregate_power: VotingPower,
    },
    /// A validator attested two hashes at one height
    EquivocationObserved {
        /// Validator
        validator: Address,
        /// Height
        block_number: BlockNumber,
        /// Hash attested first
        first_hash: H256,
        /// Hash attested later
        second_hash: H256,
    },
    /// A hash reached quorum
    BlockFinalized {
        /// Height
        block_number: BlockNumber,
        /// Hash
        block_hash: H256,
        /// Aggregate power at finality
        aggregate_power: VotingPower,
        /// Quorum threshold at finality
        threshold: VotingPower,
    },
    /// Double-sign evidence was acted on
    DoubleSignProcessed {
        /// Validator
        validator: Address,
        /// Height
        block_number: BlockNumber,
        /// Evidence identifier
        evidence_hash: H256,
    },
    /// Stake was moved from escrow to treasury
    Slashed {
        /// Role
        role: Role,
        /// Offender
        offender: Address,
        /// Offense
        offense: Offense,
        /// Amount slashed
        amount: Stake,
        /// Stake remaining
        remaining_stake: Stake,
    },
    /// A participant was jailed
    Jailed {
        /// Role
        role: Role,
        /// Identity
        identity: Address,
        /// End of the term
        until: BlockNumber,
    },
    /// A participant returned from jail
    Unjailed {
        /// Role
        role: Role,
        /// Identity
        identity: Address,
    },
    /// An epoch closed and the next one opened
    EpochAdvanced {
        /// New epoch number
        epoch: u64,
        /// Opening block
        start_block: BlockNumber,
        /// Opening time
        start_time: Timestamp,
        /// Snapshot total power
        total_voting_power: VotingPower,
        /// Snapshot commitment
        validator_set_hash: H256,
    },
    /// A force-inclusion request was recorded
    InclusionRequested {
        /// Requester
        requester: Address,
        /// Transaction reference
        tx_ref: H256,
    },
    /// The oracle confirmed inclusion
    InclusionConfirmed {
        /// Transaction reference
        tx_ref: H256,
    },
    /// Requests expired and the leader was charged for censorship
    CensorshipDetected {
        /// Charged leader
        leader: Address,
        /// Expired references
        tx_refs: Vec<H256>,
    },
}

impl ConsensusEvent {
    /// Short name used in logs and CLI output.
    pub fn name(&self) -> &'static str {
        match self {
            ConsensusEvent::ParticipantRegistered { .. } => "participant_registered",
            ConsensusEvent::ParticipantDeactivated { .. } => "participant_deactivated",
            ConsensusEvent::StakeUpdated { .. } => "stake_updated",
            ConsensusEvent::UptimeRecorded { .. } => "uptime_recorded",
            ConsensusEvent::LeaderAssigned { .. } => "leader_assigned",
            ConsensusEvent::RotationCompleted { .. } => "rotation_completed",
            ConsensusEvent::BlockProduced { .. } => "block_produced",
            ConsensusEvent::LeaderTimedOut { .. } => "leader_timed_out",
            ConsensusEvent::InvalidBlockReported { .. } => "invalid_block_reported",
            ConsensusEvent::ProposerElected { .. } => "proposer_elected",
            ConsensusEvent::AttestationAccepted { .. } => "attestation_accepted",
            ConsensusEvent::EquivocationObserved { .. } => "equivocation_observed",
            ConsensusEvent::BlockFinalized { .. } => "block_finalized",
            ConsensusEvent::DoubleSignProcessed { .. } => "double_sign_processed",
            ConsensusEvent::Slashed { .. } => "slashed",
            ConsensusEvent::Jailed { .. } => "jailed",
            ConsensusEvent::Unjailed { .. } => "unjailed",
            ConsensusEvent::EpochAdvanced { .. } => "epoch_advanced",
            ConsensusEvent::InclusionRequested { .. } => "inclusion_requested",
            ConsensusEvent::InclusionConfirmed { .. } => "inclusion_confirmed",
            ConsensusEvent::CensorshipDetected { .. } => "censorship_detected",
        }
    }
}

impl fmt::Display for ConsensusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusEvent::ParticipantRegistered { role, identity, stake, .. } => {
                write!(f, "{} {} registered with stake {}", role, identity, stake)
            }
            ConsensusEvent::ParticipantDeactivated { role, identity, released } => {
                write!(f, "{} {} deactivated, released {}", role, identity, released)
            }
            ConsensusEvent::StakeUpdated { role, identity, old_stake, new_stake } => {
                write!(f, "{} {} stake {} -> {}", role, identity, old_stake, new_stake)
            }
            ConsensusEvent::UptimeRecorded { role, identity, uptime_bps } => {
                write!(f, "{} {} uptime {} bps", role, identity, uptime_bps)
            }
            ConsensusEvent::LeaderAssigned { rotation, leader, block } => {
                write!(f, "rotation {}: leader {} from block {}", rotation, leader, block)
            }
            ConsensusEvent::RotationCompleted { rotation, leader, blocks_produced, reason } => write!(
                f,
                "rotation {} ended ({}): {} produced {} blocks",
                rotation, reason, leader, blocks_produced
            ),
            ConsensusEvent::BlockProduced { producer, block_number, block_hash } => {
                write!(f, "block {} {} produced by {}", block_number, block_hash, producer)
            }
            ConsensusEvent::LeaderTimedOut { leader, missed_blocks, timeout_count } => write!(
                f,
                "leader {} timed out after {} missed blocks ({} timeouts)",
                leader, missed_blocks, timeout_count
            ),
            ConsensusEvent::InvalidBlockReported { reporter, sequencer, block_number } => write!(
                f,
                "{} reported invalid block {} by {}",
                reporter, block_number, sequencer
            ),
            ConsensusEvent::ProposerElected { proposer, election } => {
                write!(f, "election {}: proposer {}", election, proposer)
            }
            ConsensusEvent::AttestationAccepted { validator, block_number, aggregate_power, .. } => write!(
                f,
                "{} attested block {} (aggregate {})",
                validator, block_number, aggregate_power
            ),
            ConsensusEvent::EquivocationObserved { validator, block_number, .. } => {
                write!(f, "{} attested two hashes at block {}", validator, block_number)
            }
            ConsensusEvent::BlockFinalized { block_number, block_hash, aggregate_power, threshold } => write!(
                f,
                "block {} {} finalized ({}/{})",
                block_number, block_hash, aggregate_power, threshold
            ),
            ConsensusEvent::DoubleSignProcessed { validator, block_number, .. } => {
                write!(f, "double sign by {} at block {} processed", validator, block_number)
            }
            ConsensusEvent::Slashed { role, offender, offense, amount, remaining_stake } => write!(
                f,
                "{} {} slashed {} for {} ({} left)",
                role, offender, amount, offense, remaining_stake
            ),
            ConsensusEvent::Jailed { role, identity, until } => {
                write!(f, "{} {} jailed until block {}", role, identity, until)
            }
            ConsensusEvent::Unjailed { role, identity } => write!(f, "{} {} unjailed", role, identity),
            ConsensusEvent::EpochAdvanced { epoch, start_block, total_voting_power, .. } => write!(
                f,
                "epoch {} opened at block {} (power {})",
                epoch, start_block, total_voting_power
            ),
            ConsensusEvent::InclusionRequested { requester, tx_ref } => {
                write!(f, "{} requested inclusion of {}", requester, tx_ref)
            }
            ConsensusEvent::InclusionConfirmed { tx_ref } => write!(f, "{} included", tx_ref),
            ConsensusEvent::CensorshipDetected { leader, tx_refs } => write!(
                f,
                "leader {} censored {} request(s)",
                leader,
                tx_refs.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_tag() {
        let event = ConsensusEvent::Unjailed {
            role: Role::Validator,
            identity: Address::from_low_u64_be(1),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "unjailed");
        assert_eq!(json["role"], "validator");
        assert_eq!(event.name(), "unjailed");
    }
}
