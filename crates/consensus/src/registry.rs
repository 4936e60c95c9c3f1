//! # Participant Registry
//!
//! One registry per role. Participants live in an arena in registration order
//! and are never removed from it; an address index gives O(1) lookup. The
//! [`ActiveSet`] lists the arena slots currently eligible to lead or vote.
//!
//! ## Active set maintenance
//!
//! Removal swaps the last member into the vacated position and pops, so it is
//! O(1). The returned [`Removal`] tells the role's [`SelectionPolicy`] which
//! positions moved so it can re-base any index it keeps into the set.
//!
//! ## Selection policies
//!
//! Sequencers rotate round-robin ([`crate::rotation::RoundRobin`]); validators
//! are elected by accumulated priority ([`crate::election::WeightedElection`]).
//! Both sit behind the same registry and observe membership through the
//! policy hooks.

use cadence_types::{Address, Role, Stake, VotingPower};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::error::{ConsensusError, ConsensusResult};
use crate::types::{Participant, ParticipantStatus};

/// Effect of removing a member from an [`ActiveSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removal {
    /// Position the removed member occupied
    pub position: usize,
    /// Former position of the member swapped into `position`, if any
    pub moved_from: Option<usize>,
    /// Set size after removal
    pub remaining: usize,
}

/// Ordered set of arena slots eligible for selection.
#[derive(Debug, Clone, Default)]
pub struct ActiveSet {
    members: Vec<usize>,
    positions: HashMap<usize, usize>,
}

impl ActiveSet {
    /// Appends `slot`; returns its position. Existing members keep theirs.
    pub fn insert(&mut self, slot: usize) -> usize {
        if let Some(position) = self.positions.get(&slot) {
            return *position;
        }
        let position = self.members.len();
        self.members.push(slot);
        self.positions.insert(slot, position);
        position
    }

    /// Swap-removes `slot`.
    pub fn remove(&mut self, slot: usize) -> Option<Removal> {
        let position = self.positions.remove(&slot)?;
        let last = self.members.len() - 1;
        self.members.swap_remove(position);

        let moved_from = if position != last {
            let moved = self.members[position];
            self.positions.insert(moved, position);
            Some(last)
        } else {
            None
        };

        Some(Removal {
            position,
            moved_from,
            remaining: self.members.len(),
        })
    }

    /// Slot at `position`.
    pub fn get(&self, position: usize) -> Option<usize> {
        self.members.get(position).copied()
    }

    /// Position of `slot`.
    pub fn position_of(&self, slot: usize) -> Option<usize> {
        self.positions.get(&slot).copied()
    }

    /// Whether `slot` is a member.
    pub fn contains(&self, slot: usize) -> bool {
        self.positions.contains_key(&slot)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// No members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Slots in set order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.members.iter().copied()
    }
}

/// Role-specific selection bookkeeping driven by registry membership changes.
pub trait SelectionPolicy: Clone + fmt::Debug {
    /// Voting power carried by `stake`. Unweighted policies return zero.
    fn power_for(&self, _stake: Stake) -> VotingPower {
        0
    }

    /// Whether `stake` is enough to take part, beyond the registry minimum.
    fn admits_stake(&self, _stake: Stake) -> bool {
        true
    }

    /// A participant entered the active set.
    fn on_join(&mut self, slot: usize, participant: &Participant) -> ConsensusResult<()>;

    /// A participant left the active set.
    fn on_leave(&mut self, slot: usize, participant: &Participant, removal: Removal);

    /// An active participant's power is about to change.
    fn on_reweight(
        &mut self,
        _slot: usize,
        _old: VotingPower,
        _new: VotingPower,
    ) -> ConsensusResult<()> {
        Ok(())
    }
}

/// Participants of one role.
#[derive(Debug, Clone)]
pub struct ParticipantRegistry<P> {
    role: Role,
    min_stake: Stake,
    participants: Vec<Participant>,
    index: HashMap<Address, usize>,
    active: ActiveSet,
    policy: P,
}

impl<P: SelectionPolicy> ParticipantRegistry<P> {
    /// Creates an empty registry.
    pub fn new(role: Role, min_stake: Stake, policy: P) -> Self {
        Self {
            role,
            min_stake,
            participants: Vec::new(),
            index: HashMap::new(),
            active: ActiveSet::default(),
            policy,
        }
    }

    /// Role of this registry.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Minimum stake for non-permanent participants.
    pub fn min_stake(&self) -> Stake {
        self.min_stake
    }

    /// Selection policy state.
    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub(crate) fn policy_mut(&mut self) -> &mut P {
        &mut self.policy
    }

    /// Participant by identity.
    pub fn get(&self, identity: &Address) -> Option<&Participant> {
        self.index.get(identity).map(|slot| &self.participants[*slot])
    }

    /// Participant by identity, or `NotFound`.
    pub fn require(&self, identity: &Address) -> ConsensusResult<&Participant> {
        self.get(identity).ok_or(ConsensusError::NotFound {
            role: self.role,
            identity: *identity,
        })
    }

    pub(crate) fn require_mut(&mut self, identity: &Address) -> ConsensusResult<&mut Participant> {
        let slot = self.slot_of(identity)?;
        Ok(&mut self.participants[slot])
    }

    /// Participant in a usable state: `NotActive` if deactivated, `Jailed` if jailed.
    pub fn require_active(&self, identity: &Address) -> ConsensusResult<&Participant> {
        let participant = self.require(identity)?;
        match participant.status {
            ParticipantStatus::Active | ParticipantStatus::Permanent => Ok(participant),
            ParticipantStatus::Jailed => Err(ConsensusError::Jailed {
                identity: *identity,
                until: participant.jailed_until,
            }),
            ParticipantStatus::Deactivated => Err(ConsensusError::NotActive {
                role: self.role,
                identity: *identity,
            }),
        }
    }

    fn slot_of(&self, identity: &Address) -> ConsensusResult<usize> {
        self.index
            .get(identity)
            .copied()
            .ok_or(ConsensusError::NotFound {
                role: self.role,
                identity: *identity,
            })
    }

    /// Whether the participant's stake satisfies the role.
    ///
    /// Permanent participants always do.
    pub fn meets_minimum(&self, participant: &Participant) -> bool {
        participant.permanent
            || (participant.stake >= self.min_stake && self.policy.admits_stake(participant.stake))
    }

    /// Adds a participant to the arena and the active set.
    pub fn register(&mut self, mut participant: Participant) -> ConsensusResult<()> {
        if self.index.contains_key(&participant.address) {
            return Err(ConsensusError::AlreadyRegistered {
                role: self.role,
                identity: participant.address,
            });
        }
        if !participant.permanent && participant.stake < self.min_stake {
            return Err(ConsensusError::InsufficientStake {
                required: self.min_stake,
                available: participant.stake,
            });
        }

        participant.voting_power = self.policy.power_for(participant.stake);
        let slot = self.participants.len();
        self.policy.on_join(slot, &participant)?;

        self.index.insert(participant.address, slot);
        self.participants.push(participant);
        let position = self.active.insert(slot);

        debug!(
            role = %self.role,
            slot,
            position,
            active = self.active.len(),
            "Participant added to active set"
        );
        Ok(())
    }

    /// Removes an active participant from the active set and sets its status.
    ///
    /// Returns `None` if it was not in the active set.
    pub(crate) fn leave(
        &mut self,
        identity: &Address,
        status: ParticipantStatus,
    ) -> ConsensusResult<Option<Removal>> {
        let slot = self.slot_of(identity)?;
        let removal = self.active.remove(slot);
        if let Some(removal) = removal {
            self.policy
                .on_leave(slot, &self.participants[slot], removal);
        }
        self.participants[slot].status = status;
        Ok(removal)
    }

    /// Returns a participant to the active set with its restored status.
    pub(crate) fn rejoin(&mut self, identity: &Address) -> ConsensusResult<()> {
        let slot = self.slot_of(identity)?;
        let participant = &mut self.participants[slot];
        participant.status = participant.restored_status();
        participant.voting_power = self.policy.power_for(participant.stake);
        self.policy.on_join(slot, &self.participants[slot])?;
        self.active.insert(slot);
        Ok(())
    }

    /// Replaces a participant's stake, re-deriving its voting power.
    pub(crate) fn set_stake(&mut self, identity: &Address, stake: Stake) -> ConsensusResult<()> {
        let slot = self.slot_of(identity)?;
        let old_power = self.participants[slot].voting_power;
        let new_power = self.policy.power_for(stake);
        if self.active.contains(slot) {
            self.policy.on_reweight(slot, old_power, new_power)?;
        }
        let participant = &mut self.participants[slot];
        participant.stake = stake;
        participant.voting_power = new_power;
        Ok(())
    }

    /// Number of registered participants, in any state.
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// No participants registered.
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// All participants in registration order.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter()
    }

    /// Active participants in registration order.
    pub fn eligible(&self) -> impl Iterator<Item = &Participant> {
        self.participants
            .iter()
            .enumerate()
            .filter(|(slot, _)| self.active.contains(*slot))
            .map(|(_, p)| p)
    }

    /// Active participants in active-set order.
    pub fn active_members(&self) -> impl Iterator<Item = &Participant> {
        self.active.iter().map(|slot| &self.participants[slot])
    }

    /// Size of the active set.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Whether `identity` is in the active set.
    pub fn is_active(&self, identity: &Address) -> bool {
        self.index
            .get(identity)
            .map_or(false, |slot| self.active.contains(*slot))
    }

    pub(crate) fn active_set(&self) -> &ActiveSet {
        &self.active
    }

    pub(crate) fn slot(&self, slot: usize) -> &Participant {
        &self.participants[slot]
    }

    pub(crate) fn index_of(&self, identity: &Address) -> Option<usize> {
        self.index.get(identity).copied()
    }

    /// Sum of stake held for every participant of this role.
    pub fn total_stake(&self) -> Stake {
        self.participants
            .iter()
            .fold(0, |acc: Stake, p| acc.saturating_add(p.stake))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockContext;

    #[derive(Debug, Clone, Default)]
    struct Recorder {
        joins: Vec<usize>,
        leaves: Vec<(usize, Removal)>,
    }

    impl SelectionPolicy for Recorder {
        fn on_join(&mut self, slot: usize, _: &Participant) -> ConsensusResult<()> {
            self.joins.push(slot);
            Ok(())
        }

        fn on_leave(&mut self, slot: usize, _: &Participant, removal: Removal) {
            self.leaves.push((slot, removal));
        }
    }

    fn participant(n: u64, stake: Stake) -> Participant {
        Participant::new(
            Address::from_low_u64_be(n),
            Role::Sequencer,
            stake,
            "",
            BlockContext::default(),
            false,
        )
    }

    #[test]
    fn test_active_set_swap_remove() {
        let mut set = ActiveSet::default();
        for slot in 0..4 {
            set.insert(slot);
        }
        let removal = set.remove(1).unwrap();
        assert_eq!(
            removal,
            Removal {
                position: 1,
                moved_from: Some(3),
                remaining: 3
            }
        );
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 3, 2]);
        assert_eq!(set.position_of(3), Some(1));

        let removal = set.remove(2).unwrap();
        assert_eq!(removal.moved_from, None);
        assert!(set.remove(2).is_none());
    }

    #[test]
    fn test_register_and_duplicate() {
        let mut registry = ParticipantRegistry::new(Role::Sequencer, 100, Recorder::default());
        registry.register(participant(1, 100)).unwrap();
        assert!(matches!(
            registry.register(participant(1, 500)),
            Err(ConsensusError::AlreadyRegistered { .. })
        ));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.policy().joins, vec![0]);
    }

    #[test]
    fn test_register_below_minimum() {
        let mut registry = ParticipantRegistry::new(Role::Sequencer, 100, Recorder::default());
        assert_eq!(
            registry.register(participant(1, 99)),
            Err(ConsensusError::InsufficientStake {
                required: 100,
                available: 99
            })
        );
    }

    #[test]
    fn test_leave_keeps_history_and_reports_removal() {
        let mut registry = ParticipantRegistry::new(Role::Sequencer, 1, Recorder::default());
        for n in 1..=3 {
            registry.register(participant(n, 10)).unwrap();
        }
        let removal = registry
            .leave(&Address::from_low_u64_be(1), ParticipantStatus::Deactivated)
            .unwrap()
            .unwrap();
        assert_eq!(removal.moved_from, Some(2));
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.active_len(), 2);
        assert!(!registry.is_active(&Address::from_low_u64_be(1)));
        assert!(matches!(
            registry.require_active(&Address::from_low_u64_be(1)),
            Err(ConsensusError::NotActive { .. })
        ));
        // registration order survives swap-remove
        let eligible: Vec<_> = registry.eligible().map(|p| p.address).collect();
        assert_eq!(
            eligible,
            vec![Address::from_low_u64_be(2), Address::from_low_u64_be(3)]
        );
    }

    #[test]
    fn test_rejoin_restores_status() {
        let mut registry = ParticipantRegistry::new(Role::Sequencer, 1, Recorder::default());
        registry.register(participant(1, 10)).unwrap();
        let id = Address::from_low_u64_be(1);
        registry.leave(&id, ParticipantStatus::Jailed).unwrap();
        assert!(matches!(
            registry.require_active(&id),
            Err(ConsensusError::Jailed { .. })
        ));
        registry.rejoin(&id).unwrap();
        assert_eq!(registry.get(&id).unwrap().status, ParticipantStatus::Active);
        assert!(registry.is_active(&id));
    }

    #[test]
    fn test_total_stake_counts_inactive() {
        let mut registry = ParticipantRegistry::new(Role::Sequencer, 1, Recorder::default());
        registry.register(participant(1, 10)).unwrap();
        registry.register(participant(2, 20)).unwrap();
        registry
            .leave(&Address::from_low_u64_be(2), ParticipantStatus::Jailed)
            .unwrap();
        assert_eq!(registry.total_stake(), 30);
    }
}
