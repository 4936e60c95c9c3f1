//! # Weighted Proposer Election
//!
//! Validators are elected by accumulated priority. Each election adds every
//! active validator's voting power to its priority, picks the highest
//! (earliest registered on ties) and subtracts the total power from the
//! winner. Over `total` elections each validator is chosen exactly
//! `power` times.
//!
//! ```text
//! powers A=100 B=300, total 400
//!
//!   round   A      B      winner
//!   1       100    300    B  → B = -100
//!   2       200    200    A  → A = -200
//!   3      -100    500    B  → B =  100
//!   4       0      400    B  → B =  0
//! ```

use cadence_types::{Address, Stake, VotingPower};
use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::error::{ConsensusError, ConsensusResult};
use crate::registry::{ParticipantRegistry, Removal, SelectionPolicy};
use crate::types::Participant;

/// Ceiling on the summed voting power of the active set.
///
/// Keeps every priority comfortably inside `i64` after repeated elections.
pub const MAX_TOTAL_VOTING_POWER: i64 = i64::MAX / 8;

/// Minimum power that finalizes a block: strictly more than two thirds.
pub fn quorum_threshold(total: VotingPower) -> VotingPower {
    (u128::from(total) * 2 / 3 + 1) as VotingPower
}

/// Accumulated-priority state for the validator active set.
#[derive(Debug, Clone)]
pub struct WeightedElection {
    stake_per_power: Stake,
    total_power: VotingPower,
    priorities: BTreeMap<usize, i64>,
    proposer: Option<Address>,
    elections: u64,
}

impl WeightedElection {
    /// Creates an empty election. `stake_per_power` must be non-zero.
    pub fn new(stake_per_power: Stake) -> Self {
        Self {
            stake_per_power: stake_per_power.max(1),
            total_power: 0,
            priorities: BTreeMap::new(),
            proposer: None,
            elections: 0,
        }
    }

    /// Stake units per unit of voting power.
    pub fn stake_per_power(&self) -> Stake {
        self.stake_per_power
    }

    /// Summed power of the active set.
    pub fn total_power(&self) -> VotingPower {
        self.total_power
    }

    /// Most recently elected proposer.
    pub fn proposer(&self) -> Option<Address> {
        self.proposer
    }

    /// Number of elections run.
    pub fn elections(&self) -> u64 {
        self.elections
    }

    /// Accumulated priority of an arena slot, if active.
    pub fn priority(&self, slot: usize) -> Option<i64> {
        self.priorities.get(&slot).copied()
    }

    fn check_ceiling(total: u128) -> ConsensusResult<()> {
        if total > MAX_TOTAL_VOTING_POWER as u128 {
            return Err(ConsensusError::InvalidVotingPower(format!(
                "total voting power {} exceeds {}",
                total, MAX_TOTAL_VOTING_POWER
            )));
        }
        Ok(())
    }
}

impl SelectionPolicy for WeightedElection {
    fn power_for(&self, stake: Stake) -> VotingPower {
        VotingPower::try_from(stake / self.stake_per_power).unwrap_or(VotingPower::MAX)
    }

    fn admits_stake(&self, stake: Stake) -> bool {
        self.power_for(stake) > 0
    }

    fn on_join(&mut self, slot: usize, participant: &Participant) -> ConsensusResult<()> {
        if participant.voting_power == 0 {
            return Err(ConsensusError::InvalidVotingPower(format!(
                "stake {} yields zero voting power at {} per unit",
                participant.stake, self.stake_per_power
            )));
        }
        let total = u128::from(self.total_power) + u128::from(participant.voting_power);
        Self::check_ceiling(total)?;

        self.total_power = total as VotingPower;
        self.priorities.insert(slot, 0);
        Ok(())
    }

    fn on_leave(&mut self, slot: usize, participant: &Participant, _removal: Removal) {
        self.total_power = self.total_power.saturating_sub(participant.voting_power);
        self.priorities.remove(&slot);
        if self.proposer == Some(participant.address) {
            self.proposer = None;
        }
    }

    fn on_reweight(&mut self, _slot: usize, old: VotingPower, new: VotingPower) -> ConsensusResult<()> {
        let total = u128::from(self.total_power.saturating_sub(old)) + u128::from(new);
        Self::check_ceiling(total)?;
        self.total_power = total as VotingPower;
        Ok(())
    }
}

impl ParticipantRegistry<WeightedElection> {
    /// Runs one election and returns the proposer.
    pub fn elect_proposer(&mut self) -> ConsensusResult<Address> {
        // priorities are keyed by arena slot, so this is registration order
        let candidates: Vec<(usize, VotingPower, Address)> = self
            .policy()
            .priorities
            .keys()
            .map(|slot| {
                let p = self.slot(*slot);
                (*slot, p.voting_power, p.address)
            })
            .collect();
        if candidates.is_empty() {
            return Err(ConsensusError::NoEligibleLeader);
        }

        let policy = self.policy_mut();
        let total = policy.total_power as i64;
        let mut winner: Option<(usize, i64, Address)> = None;

        for (slot, power, address) in candidates {
            let priority = policy.priorities.entry(slot).or_insert(0);
            *priority = priority.saturating_add(power as i64);
            trace!(validator = %address, priority = *priority, "Priority incremented");
            if winner.map_or(true, |(_, best, _)| *priority > best) {
                winner = Some((slot, *priority, address));
            }
        }

        let (slot, priority, address) = winner.ok_or(ConsensusError::NoEligibleLeader)?;
        let updated = priority.saturating_sub(total);
        policy.priorities.insert(slot, updated);
        policy.proposer = Some(address);
        policy.elections += 1;

        debug!(
            proposer = %address,
            priority = updated,
            total_power = total,
            election = policy.elections,
            "Proposer elected"
        );
        Ok(address)
    }

    /// Summed power of the active validator set.
    pub fn total_voting_power(&self) -> VotingPower {
        self.policy().total_power()
    }

    /// Finality threshold for the current active set.
    pub fn quorum(&self) -> VotingPower {
        quorum_threshold(self.total_voting_power())
    }
}
