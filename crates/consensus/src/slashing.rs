//! # Slashing and Jailing
//!
//! Penalties are a fraction of the offender's stake expressed in basis points.
//! Slashed funds move from the escrow account to the treasury; the engine
//! performs the movement, this module only decides the amounts and the
//! resulting participant state.
//!
//! A participant whose stake falls below its role minimum is jailed. Invalid
//! blocks and double signing jail unconditionally. Jail terms run for
//! `jail_duration_blocks`; afterwards the participant may unjail if its stake
//! still qualifies. Deactivated participants can be neither slashed nor jailed.

use cadence_types::{Address, BasisPoints, BlockNumber, Role, Stake, BPS_DENOMINATOR};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use crate::error::{ConsensusError, ConsensusResult};
use crate::registry::{ParticipantRegistry, Removal, SelectionPolicy};
use crate::types::{Participant, ParticipantStatus};

/// `amount * bps / 10000`, rounded down, without intermediate overflow.
pub fn apply_bps(amount: Stake, bps: BasisPoints) -> Stake {
    let denominator = Stake::from(BPS_DENOMINATOR);
    let bps = Stake::from(bps);
    amount / denominator * bps + amount % denominator * bps / denominator
}

/// Punishable behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Offense {
    /// Leader produced nothing within the timeout window
    Timeout,
    /// Leader produced a block reported as invalid
    InvalidBlock,
    /// Validator attested two hashes at one height
    DoubleSign,
    /// Reported uptime below the threshold
    Downtime,
    /// Leader ignored an expired force-inclusion request
    Censorship,
}

impl fmt::Display for Offense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Offense::Timeout => "timeout",
            Offense::InvalidBlock => "invalid_block",
            Offense::DoubleSign => "double_sign",
            Offense::Downtime => "downtime",
            Offense::Censorship => "censorship",
        };
        f.write_str(s)
    }
}

/// Penalty per offense, in basis points of stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyTable {
    /// Leader timeout
    pub timeout_bps: BasisPoints,
    /// Invalid block
    pub invalid_block_bps: BasisPoints,
    /// Double signing
    pub double_sign_bps: BasisPoints,
    /// Low uptime
    pub downtime_bps: BasisPoints,
    /// Censorship
    pub censorship_bps: BasisPoints,
}

impl PenaltyTable {
    /// Basis points charged for `offense`.
    pub fn bps(&self, offense: Offense) -> BasisPoints {
        match offense {
            Offense::Timeout => self.timeout_bps,
            Offense::InvalidBlock => self.invalid_block_bps,
            Offense::DoubleSign => self.double_sign_bps,
            Offense::Downtime => self.downtime_bps,
            Offense::Censorship => self.censorship_bps,
        }
    }
}

impl Default for PenaltyTable {
    fn default() -> Self {
        Self {
            timeout_bps: 1_000,
            invalid_block_bps: 5_000,
            double_sign_bps: 5_000,
            downtime_bps: 500,
            censorship_bps: 500,
        }
    }
}

/// A penalty that was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashRecord {
    /// Penalized identity
    pub offender: Address,
    /// Its role
    pub role: Role,
    /// What it did
    pub offense: Offense,
    /// Amount moved from escrow to treasury
    pub amount: Stake,
    /// Block at which the penalty applied
    pub block: BlockNumber,
    /// Stake left afterwards
    pub remaining_stake: Stake,
    /// Whether the slash itself left the participant jailed
    pub jailed: bool,
}

/// Outcome of jailing a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JailOutcome {
    /// Block at which the term ends
    pub until: BlockNumber,
    /// Active-set removal, if it was active
    pub removal: Option<Removal>,
}

/// Penalty schedule and jail terms.
#[derive(Debug, Clone)]
pub struct SlashingEngine {
    penalties: PenaltyTable,
    jail_duration: u64,
    uptime_threshold: BasisPoints,
}

impl SlashingEngine {
    /// Creates an engine.
    pub fn new(penalties: PenaltyTable, jail_duration: u64, uptime_threshold: BasisPoints) -> Self {
        Self {
            penalties,
            jail_duration,
            uptime_threshold,
        }
    }

    /// Penalty table.
    pub fn penalties(&self) -> &PenaltyTable {
        &self.penalties
    }

    /// Jail term in blocks.
    pub fn jail_duration(&self) -> u64 {
        self.jail_duration
    }

    /// Uptime below which a participant is penalized.
    pub fn uptime_threshold(&self) -> BasisPoints {
        self.uptime_threshold
    }

    /// Penalty amount for `offense` against `stake`.
    pub fn penalty(&self, stake: Stake, offense: Offense) -> Stake {
        apply_bps(stake, self.penalties.bps(offense))
    }

    /// Validates a reported uptime; returns whether it is below the threshold.
    pub fn check_uptime(&self, uptime: BasisPoints) -> ConsensusResult<bool> {
        if uptime > BPS_DENOMINATOR {
            return Err(ConsensusError::InvalidUptime(uptime));
        }
        Ok(uptime < self.uptime_threshold)
    }

    /// Deducts the penalty for `offense` from the participant's stake.
    ///
    /// An active, non-permanent participant left below its role minimum is
    /// jailed. The returned record carries the amount the caller must move
    /// from escrow to treasury. Deactivated participants cannot be slashed.
    pub fn slash<P: SelectionPolicy>(
        &self,
        registry: &mut ParticipantRegistry<P>,
        offender: &Address,
        offense: Offense,
        now: BlockNumber,
    ) -> ConsensusResult<SlashRecord> {
        let stake = require_not_deactivated(registry, offender)?.stake;
        let amount = self.penalty(stake, offense);
        let remaining = stake - amount;

        registry.set_stake(offender, remaining)?;
        let participant = registry.require_mut(offender)?;
        participant.slash_count += 1;
        participant.total_slashed = participant.total_slashed.saturating_add(amount);

        let participant = registry.require(offender)?;
        let jailed = participant.is_eligible()
            && !participant.permanent
            && !registry.meets_minimum(participant);
        if jailed {
            self.jail(registry, offender, now)?;
        }

        let record = SlashRecord {
            offender: *offender,
            role: registry.role(),
            offense,
            amount,
            block: now,
            remaining_stake: remaining,
            jailed,
        };
        warn!(
            offender = %offender,
            role = %record.role,
            %offense,
            amount,
            remaining,
            jailed,
            "Participant slashed"
        );
        Ok(record)
    }

    /// Jails a participant for the configured term.
    ///
    /// A term already running is extended, never shortened. Deactivated
    /// participants stay deactivated.
    pub fn jail<P: SelectionPolicy>(
        &self,
        registry: &mut ParticipantRegistry<P>,
        who: &Address,
        now: BlockNumber,
    ) -> ConsensusResult<JailOutcome> {
        require_not_deactivated(registry, who)?;
        let participant = registry.require_mut(who)?;
        let until = participant
            .jailed_until
            .max(now.saturating_add(self.jail_duration));
        participant.jailed_until = until;

        let removal = registry.leave(who, ParticipantStatus::Jailed)?;
        info!(participant = %who, role = %registry.role(), until, "Participant jailed");
        Ok(JailOutcome { until, removal })
    }

    /// Returns a jailed participant to the active set.
    pub fn unjail<P: SelectionPolicy>(
        &self,
        registry: &mut ParticipantRegistry<P>,
        who: &Address,
        now: BlockNumber,
    ) -> ConsensusResult<()> {
        let participant = registry.require(who)?;
        if !participant.is_jailed() {
            return Err(ConsensusError::NotJailed(*who));
        }
        if now < participant.jailed_until {
            return Err(ConsensusError::StillJailed {
                identity: *who,
                until: participant.jailed_until,
            });
        }
        if !registry.meets_minimum(participant) {
            return Err(ConsensusError::InsufficientStake {
                required: registry.min_stake(),
                available: participant.stake,
            });
        }

        registry.rejoin(who)?;
        registry.require_mut(who)?.timeout_count = 0;
        info!(participant = %who, role = %registry.role(), block = now, "Participant unjailed");
        Ok(())
    }
}

fn require_not_deactivated<'a, P: SelectionPolicy>(
    registry: &'a ParticipantRegistry<P>,
    who: &Address,
) -> ConsensusResult<&'a Participant> {
    let participant = registry.require(who)?;
    if participant.status == ParticipantStatus::Deactivated {
        return Err(ConsensusError::NotActive {
            role: registry.role(),
            identity: *who,
        });
    }
    Ok(participant)
}

impl Default for SlashingEngine {
    fn default() -> Self {
        Self::new(PenaltyTable::default(), 1_000, 9_900)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotation::RoundRobin;
    use crate::types::{BlockContext, Participant};

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn sequencers(stakes: &[Stake]) -> ParticipantRegistry<RoundRobin> {
        let mut registry = ParticipantRegistry::new(Role::Sequencer, 500, RoundRobin::default());
        for (i, stake) in stakes.iter().enumerate() {
            registry
                .register(Participant::new(
                    addr(i as u64 + 1),
                    Role::Sequencer,
                    *stake,
                    "",
                    BlockContext::default(),
                    false,
                ))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_apply_bps() {
        assert_eq!(apply_bps(1000, 1000), 100);
        assert_eq!(apply_bps(999, 5000), 499);
        assert_eq!(apply_bps(Stake::MAX, 10_000), Stake::MAX);
        assert_eq!(apply_bps(7, 0), 0);
    }

    #[test]
    fn test_timeout_slash_is_ten_percent() {
        let mut registry = sequencers(&[1000]);
        let engine = SlashingEngine::default();
        let record = engine.slash(&mut registry, &addr(1), Offense::Timeout, 10).unwrap();
        assert_eq!(record.amount, 100);
        assert_eq!(record.remaining_stake, 900);
        assert!(!record.jailed);

        let p = registry.get(&addr(1)).unwrap();
        assert_eq!(p.stake, 900);
        assert_eq!(p.slash_count, 1);
        assert_eq!(p.total_slashed, 100);
        assert_eq!(record.offender, addr(1));
        assert_eq!(record.block, 10);
    }

    #[test]
    fn test_slash_below_minimum_jails() {
        let mut registry = sequencers(&[900]);
        let engine = SlashingEngine::default();
        let record = engine
            .slash(&mut registry, &addr(1), Offense::InvalidBlock, 20)
            .unwrap();
        assert_eq!(record.remaining_stake, 450);
        assert!(record.jailed);
        let p = registry.get(&addr(1)).unwrap();
        assert_eq!(p.status, ParticipantStatus::Jailed);
        assert_eq!(p.jailed_until, 1020);
        assert_eq!(registry.active_len(), 0);
    }

    #[test]
    fn test_jail_extends_never_shortens() {
        let mut registry = sequencers(&[1000]);
        let engine = SlashingEngine::default();
        let first = engine.jail(&mut registry, &addr(1), 500).unwrap();
        assert_eq!(first.until, 1500);
        assert!(first.removal.is_some());
        let second = engine.jail(&mut registry, &addr(1), 100).unwrap();
        assert_eq!(second.until, 1500);
        assert!(second.removal.is_none());
    }

    #[test]
    fn test_unjail_rules() {
        let mut registry = sequencers(&[1000, 1000]);
        let engine = SlashingEngine::default();

        assert_eq!(
            engine.unjail(&mut registry, &addr(1), 0),
            Err(ConsensusError::NotJailed(addr(1)))
        );

        engine.jail(&mut registry, &addr(1), 0).unwrap();
        registry.require_mut(&addr(1)).unwrap().timeout_count = 3;
        assert_eq!(
            engine.unjail(&mut registry, &addr(1), 999),
            Err(ConsensusError::StillJailed {
                identity: addr(1),
                until: 1000
            })
        );
        engine.unjail(&mut registry, &addr(1), 1000).unwrap();
        let p = registry.get(&addr(1)).unwrap();
        assert_eq!(p.status, ParticipantStatus::Active);
        assert_eq!(p.timeout_count, 0);
        assert!(registry.is_active(&addr(1)));
    }

    #[test]
    fn test_unjail_requires_minimum_stake() {
        let mut registry = sequencers(&[1000]);
        let engine = SlashingEngine::default();
        engine.jail(&mut registry, &addr(1), 0).unwrap();
        registry.set_stake(&addr(1), 10).unwrap();
        assert_eq!(
            engine.unjail(&mut registry, &addr(1), 5000),
            Err(ConsensusError::InsufficientStake {
                required: 500,
                available: 10
            })
        );
    }

    #[test]
    fn test_uptime_bounds() {
        let engine = SlashingEngine::default();
        assert_eq!(engine.check_uptime(10_001), Err(ConsensusError::InvalidUptime(10_001)));
        assert_eq!(engine.check_uptime(9_899), Ok(true));
        assert_eq!(engine.check_uptime(9_900), Ok(false));
    }

    #[test]
    fn test_unknown_offender() {
        let mut registry = sequencers(&[]);
        let engine = SlashingEngine::default();
        assert!(matches!(
            engine.slash(&mut registry, &addr(9), Offense::Downtime, 0),
            Err(ConsensusError::NotFound { .. })
        ));
    }

    #[test]
    fn test_deactivated_cannot_be_jailed_or_slashed() {
        let mut registry = sequencers(&[1000, 1000]);
        let engine = SlashingEngine::default();
        registry.leave(&addr(1), ParticipantStatus::Deactivated).unwrap();
        let not_active = ConsensusError::NotActive {
            role: Role::Sequencer,
            identity: addr(1),
        };

        assert_eq!(engine.jail(&mut registry, &addr(1), 10), Err(not_active.clone()));
        assert_eq!(
            engine.slash(&mut registry, &addr(1), Offense::InvalidBlock, 10),
            Err(not_active)
        );
        let p = registry.get(&addr(1)).unwrap();
        assert_eq!(p.status, ParticipantStatus::Deactivated);
        assert_eq!(p.jailed_until, 0);
        assert_eq!(p.slash_count, 0);
        assert_eq!(
            engine.unjail(&mut registry, &addr(1), 5_000),
            Err(ConsensusError::NotJailed(addr(1)))
        );
        assert!(!registry.is_active(&addr(1)));
    }
}
