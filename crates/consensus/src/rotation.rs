//! # Sequencer Rotation
//!
//! The liveness layer. One sequencer holds the leader slot at a time and
//! produces blocks until it has produced `rotation_interval_blocks` of them,
//! then the slot passes round-robin to the next active sequencer.
//!
//! ```text
//!   Assigned ──produce──▶ Producing ──interval reached──▶ Rotating ──▶ Assigned
//!       │                     │                              ▲
//!       └──── no activity for timeout_blocks ─────────────────┘ (slash, forced)
//! ```
//!
//! A leader that shows no activity for `timeout_blocks` is slashed and the slot
//! is forced onward. Every tenure is kept as a [`RotationRecord`].

use cadence_types::{Address, BlockNumber};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::error::{ConsensusError, ConsensusResult};
use crate::registry::{ParticipantRegistry, Removal, SelectionPolicy};
use crate::types::Participant;

/// Round-robin cursor over the sequencer active set.
///
/// The cursor is a position in the active set. When the member it points at
/// is removed, it ends up on the member swapped into that position, or wraps
/// to zero if the removed member was last.
#[derive(Debug, Clone, Default)]
pub struct RoundRobin {
    cursor: usize,
}

impl RoundRobin {
    /// Current cursor position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl SelectionPolicy for RoundRobin {
    fn on_join(&mut self, _slot: usize, _participant: &Participant) -> ConsensusResult<()> {
        Ok(())
    }

    fn on_leave(&mut self, _slot: usize, _participant: &Participant, removal: Removal) {
        if removal.moved_from == Some(self.cursor) {
            self.cursor = removal.position;
        }
        if self.cursor >= removal.remaining {
            self.cursor = 0;
        }
    }
}

impl ParticipantRegistry<RoundRobin> {
    /// Picks the next leader and moves the cursor onto it.
    ///
    /// If `current` is still active, the member after it is chosen; otherwise
    /// the member at the cursor. Ineligible members are skipped. Returns `None`
    /// when no member is eligible.
    pub fn advance_leader(&mut self, current: Option<&Address>) -> Option<Address> {
        let len = self.active_len();
        if len == 0 {
            return None;
        }

        let start = match current
            .and_then(|leader| self.index_of(leader))
            .and_then(|slot| self.active_set().position_of(slot))
        {
            Some(position) => (position + 1) % len,
            None => self.policy().cursor() % len,
        };

        for offset in 0..len {
            let position = (start + offset) % len;
            let Some(slot) = self.active_set().get(position) else {
                continue;
            };
            let candidate = self.slot(slot);
            if candidate.is_eligible() {
                let address = candidate.address;
                self.policy_mut().cursor = position;
                return Some(address);
            }
        }
        None
    }
}

/// Why a leader's tenure ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationEndReason {
    /// Produced the full interval
    Scheduled,
    /// No activity within the timeout window
    Timeout,
    /// Reported for an invalid block
    InvalidBlock,
    /// Deactivated while holding the slot
    Unregistered,
    /// Jailed while holding the slot
    LeaderJailed,
    /// Forced by a manager
    Admin,
    /// Ignored a force-inclusion request
    Censorship,
}

impl RotationEndReason {
    /// Whether the tenure counts as successful.
    pub fn is_success(&self) -> bool {
        matches!(self, RotationEndReason::Scheduled | RotationEndReason::Admin)
    }
}

impl fmt::Display for RotationEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RotationEndReason::Scheduled => "scheduled",
            RotationEndReason::Timeout => "timeout",
            RotationEndReason::InvalidBlock => "invalid_block",
            RotationEndReason::Unregistered => "unregistered",
            RotationEndReason::LeaderJailed => "leader_jailed",
            RotationEndReason::Admin => "admin",
            RotationEndReason::Censorship => "censorship",
        };
        f.write_str(s)
    }
}

/// One leader tenure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationRecord {
    /// Sequence number, starting at 0
    pub number: u64,
    /// Leader for this tenure
    pub leader: Address,
    /// Block at which the tenure began
    pub start_block: BlockNumber,
    /// Block at which it ended, once closed
    pub end_block: Option<BlockNumber>,
    /// Blocks produced during the tenure
    pub blocks_produced: u64,
    /// Blocks missed during the tenure
    pub missed_blocks: u64,
    /// Whether the tenure ended normally
    pub success: bool,
    /// Why it ended, once closed
    pub end_reason: Option<RotationEndReason>,
}

impl RotationRecord {
    /// Whether the tenure is still open.
    pub fn is_open(&self) -> bool {
        self.end_block.is_none()
    }
}

/// Rotation schedule and the open tenure.
///
/// Closed tenures are returned by [`RotationEngine::close`] and not retained.
#[derive(Debug, Clone)]
pub struct RotationEngine {
    interval_blocks: u64,
    timeout_blocks: u64,
    max_timeouts: u32,
    current: Option<RotationRecord>,
    next_number: u64,
    last_activity: BlockNumber,
}

impl RotationEngine {
    /// Creates an engine with no leader.
    pub fn new(interval_blocks: u64, timeout_blocks: u64, max_timeouts: u32) -> Self {
        Self {
            interval_blocks,
            timeout_blocks,
            max_timeouts,
            current: None,
            next_number: 0,
            last_activity: 0,
        }
    }

    /// Blocks per scheduled rotation.
    pub fn interval_blocks(&self) -> u64 {
        self.interval_blocks
    }

    /// Inactivity window before a timeout.
    pub fn timeout_blocks(&self) -> u64 {
        self.timeout_blocks
    }

    /// Cumulative timeouts that jail a sequencer.
    pub fn max_timeouts(&self) -> u32 {
        self.max_timeouts
    }

    /// The open tenure, if a leader is assigned.
    pub fn current(&self) -> Option<&RotationRecord> {
        self.current.as_ref()
    }

    /// Current leader.
    pub fn leader(&self) -> Option<Address> {
        self.current().map(|r| r.leader)
    }

    /// Tenures opened so far, which is also the number of the next one.
    pub fn opened(&self) -> u64 {
        self.next_number
    }

    /// Last block at which the leader showed activity.
    pub fn last_activity(&self) -> BlockNumber {
        self.last_activity
    }

    /// First block at which the current leader may be timed out.
    pub fn timeout_deadline(&self) -> Option<BlockNumber> {
        self.current()
            .map(|_| self.last_activity.saturating_add(self.timeout_blocks))
    }

    /// Whether the current leader has produced the full interval.
    pub fn interval_reached(&self) -> bool {
        self.current()
            .map_or(false, |r| r.blocks_produced >= self.interval_blocks)
    }

    /// Closes the open tenure, if any, and returns it.
    pub fn close(&mut self, at: BlockNumber, reason: RotationEndReason) -> Option<RotationRecord> {
        let mut record = self.current.take()?;
        record.end_block = Some(at);
        record.success = reason.is_success();
        record.end_reason = Some(reason);
        debug!(
            rotation = record.number,
            leader = %record.leader,
            produced = record.blocks_produced,
            missed = record.missed_blocks,
            %reason,
            "Rotation closed"
        );
        Some(record)
    }

    /// Opens a tenure for `leader`. Any open tenure must be closed first.
    pub fn open(&mut self, leader: Address, at: BlockNumber) -> &RotationRecord {
        let number = self.next_number;
        self.next_number += 1;
        self.last_activity = at;
        info!(rotation = number, leader = %leader, block = at, "Rotation started");
        self.current.insert(RotationRecord {
            number,
            leader,
            start_block: at,
            end_block: None,
            blocks_produced: 0,
            missed_blocks: 0,
            success: false,
            end_reason: None,
        })
    }

    /// Counts a block produced by `producer`.
    pub fn record_produced(&mut self, producer: &Address, block: BlockNumber) -> ConsensusResult<u64> {
        let record = self.current.as_mut().ok_or(ConsensusError::NoEligibleLeader)?;
        if record.leader != *producer {
            return Err(ConsensusError::Unauthorized {
                caller: *producer,
                action: "produce a block without holding the leader slot",
            });
        }
        record.blocks_produced += 1;
        self.last_activity = self.last_activity.max(block);
        Ok(record.blocks_produced)
    }

    /// Checks the timeout window at `now`; returns the blocks missed.
    pub fn check_timeout(&self, now: BlockNumber) -> ConsensusResult<u64> {
        let deadline = self.timeout_deadline().ok_or(ConsensusError::NoEligibleLeader)?;
        if now < deadline {
            return Err(ConsensusError::TimeoutNotReached {
                current: now,
                deadline,
            });
        }
        Ok(now - self.last_activity)
    }

    /// Adds missed blocks to the open tenure.
    pub fn record_missed(&mut self, missed: u64) {
        if let Some(record) = self.current.as_mut() {
            record.missed_blocks += missed;
            warn!(
                rotation = record.number,
                leader = %record.leader,
                missed,
                "Leader missed blocks"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BlockContext, ParticipantStatus};
    use cadence_types::Role;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn registry(n: u64) -> ParticipantRegistry<RoundRobin> {
        let mut registry = ParticipantRegistry::new(Role::Sequencer, 1, RoundRobin::default());
        for i in 1..=n {
            registry
                .register(Participant::new(
                    addr(i),
                    Role::Sequencer,
                    10,
                    "",
                    BlockContext::default(),
                    false,
                ))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_round_robin_order() {
        let mut seqs = registry(3);
        let first = seqs.advance_leader(None).unwrap();
        assert_eq!(first, addr(1));
        let second = seqs.advance_leader(Some(&first)).unwrap();
        assert_eq!(second, addr(2));
        let third = seqs.advance_leader(Some(&second)).unwrap();
        assert_eq!(third, addr(3));
        assert_eq!(seqs.advance_leader(Some(&third)).unwrap(), addr(1));
    }

    #[test]
    fn test_removed_leader_rebases_cursor() {
        let mut seqs = registry(4);
        let mut leader = seqs.advance_leader(None).unwrap();
        leader = seqs.advance_leader(Some(&leader)).unwrap();
        assert_eq!(leader, addr(2));
        assert_eq!(seqs.policy().cursor(), 1);

        seqs.leave(&addr(2), ParticipantStatus::Jailed).unwrap();
        // addr(4) was swapped into position 1
        assert_eq!(seqs.policy().cursor(), 1);
        assert_eq!(seqs.advance_leader(Some(&addr(2))).unwrap(), addr(4));
    }

    #[test]
    fn test_cursor_follows_moved_member() {
        let mut seqs = registry(3);
        let mut leader = seqs.advance_leader(None).unwrap();
        leader = seqs.advance_leader(Some(&leader)).unwrap();
        leader = seqs.advance_leader(Some(&leader)).unwrap();
        assert_eq!(leader, addr(3));
        assert_eq!(seqs.policy().cursor(), 2);

        seqs.leave(&addr(1), ParticipantStatus::Deactivated).unwrap();
        assert_eq!(seqs.policy().cursor(), 0);
        assert_eq!(seqs.active_members().next().unwrap().address, addr(3));
    }

    #[test]
    fn test_cursor_wraps_when_last_removed() {
        let mut seqs = registry(2);
        let leader = seqs.advance_leader(None).unwrap();
        let leader = seqs.advance_leader(Some(&leader)).unwrap();
        assert_eq!(seqs.policy().cursor(), 1);
        seqs.leave(&leader, ParticipantStatus::Jailed).unwrap();
        assert_eq!(seqs.policy().cursor(), 0);
        assert_eq!(seqs.advance_leader(Some(&leader)).unwrap(), addr(1));
    }

    #[test]
    fn test_empty_set_has_no_leader() {
        let mut seqs = registry(1);
        seqs.leave(&addr(1), ParticipantStatus::Jailed).unwrap();
        assert_eq!(seqs.advance_leader(None), None);
    }

    #[test]
    fn test_engine_produce_and_timeout() {
        let mut engine = RotationEngine::new(100, 10, 3);
        assert_eq!(engine.check_timeout(50), Err(ConsensusError::NoEligibleLeader));

        engine.open(addr(1), 5);
        assert_eq!(
            engine.record_produced(&addr(2), 6),
            Err(ConsensusError::Unauthorized {
                caller: addr(2),
                action: "produce a block without holding the leader slot",
            })
        );
        assert_eq!(engine.record_produced(&addr(1), 6).unwrap(), 1);
        assert_eq!(engine.timeout_deadline(), Some(16));
        assert!(matches!(
            engine.check_timeout(15),
            Err(ConsensusError::TimeoutNotReached { current: 15, deadline: 16 })
        ));
        assert_eq!(engine.check_timeout(16).unwrap(), 10);
    }

    #[test]
    fn test_close_and_reopen() {
        let mut engine = RotationEngine::new(2, 1, 3);
        engine.open(addr(1), 0);
        engine.record_produced(&addr(1), 1).unwrap();
        engine.record_produced(&addr(1), 2).unwrap();
        assert!(engine.interval_reached());

        let closed = engine.close(2, RotationEndReason::Scheduled).unwrap();
        assert!(closed.success);
        assert_eq!(closed.end_block, Some(2));
        assert!(engine.current().is_none());
        assert!(engine.close(3, RotationEndReason::Admin).is_none());

        let opened = engine.open(addr(2), 2);
        assert_eq!(opened.number, 1);
        assert_eq!(opened.leader, addr(2));
        assert_eq!(engine.opened(), 2);
    }
}
