//! # Epochs
//!
//! Wall-clock periods measured on block timestamps. Each epoch opens with a
//! snapshot of the active validator set (with powers), the active sequencer
//! set and the total voting power. Closed epochs never change; the manager
//! hands each one back as it closes and keeps only the open epoch.

use cadence_types::{Address, BlockNumber, Timestamp, VotingPower, H256};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConsensusError, ConsensusResult};
use crate::types::{domains, BlockContext};

/// Commitment to a validator snapshot.
pub fn compute_validator_set_hash(validators: &[(Address, VotingPower)]) -> H256 {
    let mut bytes = Vec::with_capacity(domains::VALIDATOR_SET.len() + validators.len() * 28);
    bytes.extend_from_slice(domains::VALIDATOR_SET);
    for (address, power) in validators {
        bytes.extend_from_slice(address.as_bytes());
        bytes.extend_from_slice(&power.to_be_bytes());
    }
    H256::keccak256(&bytes)
}

/// One epoch and its participant snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// Epoch number, starting at 0
    pub number: u64,
    /// Opening block
    pub start_block: BlockNumber,
    /// Opening timestamp
    pub start_time: Timestamp,
    /// Closing block, once closed
    pub end_block: Option<BlockNumber>,
    /// Closing timestamp, once closed
    pub end_time: Option<Timestamp>,
    /// Active validators and their powers, in registration order
    pub validators: Vec<(Address, VotingPower)>,
    /// Active sequencers, in registration order
    pub sequencers: Vec<Address>,
    /// Summed validator power
    pub total_voting_power: VotingPower,
    /// Commitment to `validators`
    pub validator_set_hash: H256,
}

impl EpochRecord {
    fn open(
        number: u64,
        at: BlockContext,
        validators: Vec<(Address, VotingPower)>,
        sequencers: Vec<Address>,
    ) -> Self {
        let total_voting_power = validators.iter().map(|(_, p)| *p).sum();
        let validator_set_hash = compute_validator_set_hash(&validators);
        Self {
            number,
            start_block: at.number,
            start_time: at.timestamp,
            end_block: None,
            end_time: None,
            validators,
            sequencers,
            total_voting_power,
            validator_set_hash,
        }
    }

    /// Whether the epoch has been closed.
    pub fn is_closed(&self) -> bool {
        self.end_block.is_some()
    }
}

/// The open epoch and its schedule.
#[derive(Debug, Clone)]
pub struct EpochManager {
    duration_secs: u64,
    current: EpochRecord,
}

impl EpochManager {
    /// Opens epoch 0 with the genesis snapshot.
    pub fn new(
        duration_secs: u64,
        genesis: BlockContext,
        validators: Vec<(Address, VotingPower)>,
        sequencers: Vec<Address>,
    ) -> Self {
        let first = EpochRecord::open(0, genesis, validators, sequencers);
        info!(
            epoch = 0,
            validators = first.validators.len(),
            sequencers = first.sequencers.len(),
            total_power = first.total_voting_power,
            "Epoch opened"
        );
        Self {
            duration_secs,
            current: first,
        }
    }

    /// Epoch length in seconds.
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    /// The open epoch.
    pub fn current(&self) -> &EpochRecord {
        &self.current
    }

    /// Earliest timestamp at which the open epoch may close.
    pub fn ends_at(&self) -> Timestamp {
        self.current().start_time.saturating_add(self.duration_secs)
    }

    /// Closes the open epoch and opens the next with a fresh snapshot.
    ///
    /// Returns the closed epoch and the new one.
    pub fn advance(
        &mut self,
        at: BlockContext,
        validators: Vec<(Address, VotingPower)>,
        sequencers: Vec<Address>,
    ) -> ConsensusResult<(EpochRecord, &EpochRecord)> {
        let ends_at = self.ends_at();
        let number = self.current().number;
        if at.timestamp < ends_at {
            return Err(ConsensusError::EpochNotEnded {
                epoch: number,
                ends_at,
                now: at.timestamp,
            });
        }

        let next = EpochRecord::open(number + 1, at, validators, sequencers);
        info!(
            epoch = next.number,
            block = at.number,
            validators = next.validators.len(),
            sequencers = next.sequencers.len(),
            total_power = next.total_voting_power,
            "Epoch opened"
        );
        let mut closed = std::mem::replace(&mut self.current, next);
        closed.end_block = Some(at.number);
        closed.end_time = Some(at.timestamp);
        Ok((closed, &self.current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn test_epoch_zero_at_genesis() {
        let manager = EpochManager::new(
            100,
            BlockContext::new(0, 1_000),
            vec![(addr(1), 10), (addr(2), 30)],
            vec![addr(9)],
        );
        let epoch = manager.current();
        assert_eq!(epoch.number, 0);
        assert_eq!(epoch.total_voting_power, 40);
        assert!(!epoch.is_closed());
        assert_eq!(manager.ends_at(), 1_100);
    }

    #[test]
    fn test_advance_requires_duration() {
        let mut manager = EpochManager::new(100, BlockContext::new(0, 1_000), vec![], vec![]);
        assert_eq!(
            manager.advance(BlockContext::new(5, 1_099), vec![], vec![]).unwrap_err(),
            ConsensusError::EpochNotEnded {
                epoch: 0,
                ends_at: 1_100,
                now: 1_099
            }
        );
        let (closed, next) = manager
            .advance(BlockContext::new(6, 1_100), vec![(addr(1), 5)], vec![])
            .unwrap();
        assert_eq!(closed.end_block, Some(6));
        assert_eq!(next.number, 1);
        assert_eq!(next.start_time, 1_100);
        assert_eq!(manager.ends_at(), 1_200);
    }

    #[test]
    fn test_closed_epoch_keeps_its_snapshot() {
        let mut manager = EpochManager::new(10, BlockContext::new(0, 0), vec![(addr(1), 1)], vec![]);
        let (closed, _) = manager
            .advance(BlockContext::new(1, 10), vec![(addr(2), 2)], vec![])
            .unwrap();
        assert_eq!(closed.number, 0);
        assert!(closed.is_closed());
        assert_eq!(closed.validators, vec![(addr(1), 1)]);
        assert_eq!(closed.end_time, Some(10));
        assert_eq!(manager.current().validators, vec![(addr(2), 2)]);
    }

    #[test]
    fn test_validator_set_hash_depends_on_powers() {
        let a = compute_validator_set_hash(&[(addr(1), 10)]);
        let b = compute_validator_set_hash(&[(addr(1), 11)]);
        assert_ne!(a, b);
        assert_eq!(a, compute_validator_set_hash(&[(addr(1), 10)]));
    }
}
