//! # Consensus Core
//!
//! [`ConsensusCore`] owns every component and applies operations one at a time
//! in the order the caller supplies.
//!
//! ## Atomicity
//!
//! Each operation runs against a staged copy of the state and records the
//! stake movements it needs. Before anything is committed the movements are
//! replayed against a shadow of the ledger balances:
//!
//! ```text
//!   stage ──▶ simulate transfers ──▶ escrow ≥ Σ stake ? ──▶ apply to ledger ──▶ commit state + events
//!     │              │                      │                     │
//!     └── error ─────┴──── shortfall ───────┴── violation ────────┴── rollback
//! ```
//!
//! A rejected operation leaves the state, the ledger and the event outbox
//! exactly as they were.
//!
//! Only live state is staged. Closed rotations, slashes, closed epochs and
//! resolved inclusion requests are staged as a delta and appended to a log
//! that is never copied, and attestations are pruned once their height falls
//! out of the acceptance window, so the cost of staging stays flat as the
//! chain grows.

use cadence_crypto::Signature;
use cadence_types::{Address, BasisPoints, BlockNumber, Role, Stake, VotingPower, H256};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use crate::attestation::{Attestation, AttestationLedger, BlockAttestations, DoubleSignEvidence, SubmitOutcome};
use crate::election::WeightedElection;
use crate::epoch::{EpochManager, EpochRecord};
use crate::error::{ConsensusError, ConsensusResult};
use crate::events::ConsensusEvent;
use crate::force_inclusion::{ForceInclusionQueue, ForceInclusionRequest};
use crate::metrics::{ConsensusMetrics, MetricsSnapshot};
use crate::ledger::{LedgerError, StakeLedger};
use crate::operation::{Operation, OperationOutput};
use crate::params::{ConsensusParams, GenesisParticipant};
use crate::registry::ParticipantRegistry;
use crate::rotation::{RotationEndReason, RotationEngine, RotationRecord, RoundRobin};
use crate::signer::{EcdsaRecovery, SignerRecovery};
use crate::slashing::{JailOutcome, Offense, SlashRecord, SlashingEngine};
use crate::types::{BlockContext, Participant, ParticipantStatus};

/// A stake movement requested by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Transfer {
    from: Address,
    to: Address,
    amount: Stake,
}

/// Closed and resolved records, appended on commit.
#[derive(Debug, Default)]
struct CoreLog {
    rotations: Vec<RotationRecord>,
    slashes: Vec<SlashRecord>,
    epochs: Vec<EpochRecord>,
    inclusions: BTreeMap<H256, ForceInclusionRequest>,
}

/// Records a staged operation adds to the [`CoreLog`].
#[derive(Debug, Default)]
struct LogDelta {
    rotations: Vec<RotationRecord>,
    slashes: Vec<SlashRecord>,
    epochs: Vec<EpochRecord>,
    inclusions: Vec<ForceInclusionRequest>,
}

impl CoreLog {
    fn append(&mut self, delta: LogDelta) {
        self.rotations.extend(delta.rotations);
        self.slashes.extend(delta.slashes);
        self.epochs.extend(delta.epochs);
        self.inclusions
            .extend(delta.inclusions.into_iter().map(|r| (r.tx_ref, r)));
    }
}

/// Live state an operation may change.
#[derive(Debug, Clone)]
struct CoreState {
    block: BlockContext,
    sequencers: ParticipantRegistry<RoundRobin>,
    validators: ParticipantRegistry<WeightedElection>,
    rotation: RotationEngine,
    slashing: SlashingEngine,
    attestations: AttestationLedger,
    epochs: EpochManager,
    inclusion: ForceInclusionQueue,
}

impl CoreState {
    fn new(params: &ConsensusParams, at: BlockContext) -> Self {
        Self {
            block: at,
            sequencers: ParticipantRegistry::new(
                Role::Sequencer,
                params.min_sequencer_stake,
                RoundRobin::default(),
            ),
            validators: ParticipantRegistry::new(
                Role::Validator,
                params.min_validator_stake,
                WeightedElection::new(params.stake_per_power),
            ),
            rotation: RotationEngine::new(
                params.rotation_interval_blocks,
                params.timeout_blocks,
                params.max_timeouts,
            ),
            slashing: SlashingEngine::new(
                params.penalties,
                params.jail_duration_blocks,
                params.uptime_threshold_bps,
            ),
            attestations: AttestationLedger::new(params.chain_id, params.max_attestation_age),
            epochs: EpochManager::new(params.epoch_duration_secs, at, Vec::new(), Vec::new()),
            inclusion: ForceInclusionQueue::new(params.inclusion_window_blocks, params.inclusion_oracle),
        }
    }

    fn participant(&self, role: Role, identity: &Address) -> ConsensusResult<&Participant> {
        match role {
            Role::Sequencer => self.sequencers.require(identity),
            Role::Validator => self.validators.require(identity),
        }
    }

    fn participant_mut(&mut self, role: Role, identity: &Address) -> ConsensusResult<&mut Participant> {
        match role {
            Role::Sequencer => self.sequencers.require_mut(identity),
            Role::Validator => self.validators.require_mut(identity),
        }
    }

    fn total_stake(&self) -> Stake {
        self.sequencers
            .total_stake()
            .saturating_add(self.validators.total_stake())
    }

    fn validator_snapshot(&self) -> Vec<(Address, VotingPower)> {
        self.validators
            .eligible()
            .map(|p| (p.address, p.voting_power))
            .collect()
    }

    fn sequencer_snapshot(&self) -> Vec<Address> {
        self.sequencers.eligible().map(|p| p.address).collect()
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        let leader_uptime_bps = self
            .rotation
            .leader()
            .and_then(|leader| self.sequencers.get(&leader))
            .map(|p| u64::from(p.uptime_bps));
        MetricsSnapshot {
            block: self.block.number,
            epoch: self.epochs.current().number,
            rotation: self.rotation.current().map(|r| r.number),
            active_sequencers: self.sequencers.active_len(),
            active_validators: self.validators.active_len(),
            total_voting_power: self.validators.total_voting_power(),
            quorum_threshold: self.validators.quorum(),
            leader_uptime_bps,
            pending_inclusions: self.inclusion.pending().count(),
        }
    }
}

/// A staged operation: a private copy of the state plus pending effects.
struct Txn<'a, R> {
    state: CoreState,
    params: &'a ConsensusParams,
    recovery: &'a R,
    log: &'a CoreLog,
    appended: LogDelta,
    transfers: Vec<Transfer>,
    events: Vec<ConsensusEvent>,
}

impl<'a, R: SignerRecovery> Txn<'a, R> {
    fn now(&self) -> BlockNumber {
        self.state.block.number
    }

    fn transfer(&mut self, from: Address, to: Address, amount: Stake) {
        if amount > 0 && from != to {
            self.transfers.push(Transfer { from, to, amount });
        }
    }

    fn emit(&mut self, event: ConsensusEvent) {
        self.events.push(event);
    }

    fn authorize(&self, caller: &Address, identity: &Address, action: &'static str) -> ConsensusResult<()> {
        if caller == identity || self.params.is_manager(caller) {
            Ok(())
        } else {
            Err(ConsensusError::Unauthorized {
                caller: *caller,
                action,
            })
        }
    }

    fn require_manager(&self, caller: &Address, action: &'static str) -> ConsensusResult<()> {
        if self.params.is_manager(caller) {
            Ok(())
        } else {
            Err(ConsensusError::Unauthorized {
                caller: *caller,
                action,
            })
        }
    }

    // -------------------------------------------------------------------------
    // Rotation helpers
    // -------------------------------------------------------------------------

    /// Assigns a leader if the slot is empty and someone is eligible.
    fn ensure_leader(&mut self) {
        if self.state.rotation.current().is_some() {
            return;
        }
        if let Some(leader) = self.state.sequencers.advance_leader(None) {
            self.open_rotation(leader);
        }
    }

    fn open_rotation(&mut self, leader: Address) {
        let now = self.now();
        let rotation = self.state.rotation.open(leader, now).number;
        self.emit(ConsensusEvent::LeaderAssigned {
            rotation,
            leader,
            block: now,
        });
    }

    /// Ends the current tenure and hands the slot to the next eligible sequencer.
    fn force_rotation(&mut self, reason: RotationEndReason) {
        let now = self.now();
        let outgoing = match self.state.rotation.close(now, reason) {
            Some(record) => {
                self.emit(ConsensusEvent::RotationCompleted {
                    rotation: record.number,
                    leader: record.leader,
                    blocks_produced: record.blocks_produced,
                    reason,
                });
                let leader = record.leader;
                self.appended.rotations.push(record);
                Some(leader)
            }
            None => None,
        };
        match self.state.sequencers.advance_leader(outgoing.as_ref()) {
            Some(leader) => self.open_rotation(leader),
            None => warn!(%reason, block = now, "No eligible sequencer to take the leader slot"),
        }
    }

    /// Rotates away from `identity` if it holds the slot but is no longer active.
    fn rotate_if_leader_removed(&mut self, identity: &Address, reason: RotationEndReason) {
        if self.state.rotation.leader() == Some(*identity) && !self.state.sequencers.is_active(identity) {
            self.force_rotation(reason);
        }
    }

    // -------------------------------------------------------------------------
    // Penalty helpers
    // -------------------------------------------------------------------------

    fn slash(&mut self, role: Role, offender: &Address, offense: Offense) -> ConsensusResult<SlashRecord> {
        let now = self.now();
        let state = &mut self.state;
        let record = match role {
            Role::Sequencer => state.slashing.slash(&mut state.sequencers, offender, offense, now)?,
            Role::Validator => state.slashing.slash(&mut state.validators, offender, offense, now)?,
        };
        self.appended.slashes.push(record.clone());

        self.transfer(self.params.escrow, self.params.treasury, record.amount);
        self.emit(ConsensusEvent::Slashed {
            role,
            offender: *offender,
            offense,
            amount: record.amount,
            remaining_stake: record.remaining_stake,
        });
        if record.jailed {
            let until = self.state.participant(role, offender)?.jailed_until;
            self.emit(ConsensusEvent::Jailed {
                role,
                identity: *offender,
                until,
            });
        }
        Ok(record)
    }

    fn jail(&mut self, role: Role, who: &Address) -> ConsensusResult<JailOutcome> {
        let now = self.now();
        let state = &mut self.state;
        let outcome = match role {
            Role::Sequencer => state.slashing.jail(&mut state.sequencers, who, now)?,
            Role::Validator => state.slashing.jail(&mut state.validators, who, now)?,
        };
        self.emit(ConsensusEvent::Jailed {
            role,
            identity: *who,
            until: outcome.until,
        });
        Ok(outcome)
    }

    /// Removes a participant, releases its stake and hands off the leader slot.
    fn deactivate_participant(&mut self, role: Role, identity: &Address) -> ConsensusResult<()> {
        let released = self.state.participant(role, identity)?.stake;
        match role {
            Role::Sequencer => {
                self.state.sequencers.leave(identity, ParticipantStatus::Deactivated)?;
                self.state.sequencers.set_stake(identity, 0)?;
            }
            Role::Validator => {
                self.state.validators.leave(identity, ParticipantStatus::Deactivated)?;
                self.state.validators.set_stake(identity, 0)?;
            }
        }
        self.transfer(self.params.escrow, *identity, released);
        self.emit(ConsensusEvent::ParticipantDeactivated {
            role,
            identity: *identity,
            released,
        });
        info!(%role, identity = %identity, released, "Participant deactivated");

        if role == Role::Sequencer {
            self.rotate_if_leader_removed(identity, RotationEndReason::Unregistered);
        }
        Ok(())
    }

    fn register_participant(&mut self, participant: Participant) -> ConsensusResult<()> {
        let role = participant.role;
        let identity = participant.address;
        let stake = participant.stake;
        let permanent = participant.permanent;

        match role {
            Role::Sequencer => self.state.sequencers.register(participant)?,
            Role::Validator => self.state.validators.register(participant)?,
        }
        let voting_power = self.state.participant(role, &identity)?.voting_power;

        self.transfer(identity, self.params.escrow, stake);
        self.emit(ConsensusEvent::ParticipantRegistered {
            role,
            identity,
            stake,
            voting_power,
            permanent,
        });
        info!(%role, identity = %identity, stake, voting_power, permanent, "Participant registered");

        if role == Role::Sequencer {
            self.ensure_leader();
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    fn bootstrap(&mut self, participants: &[GenesisParticipant]) -> ConsensusResult<()> {
        let at = self.state.block;
        for entry in participants {
            self.register_participant(Participant::new(
                entry.address,
                entry.role,
                entry.stake,
                entry.endpoint.clone(),
                at,
                entry.permanent,
            ))?;
        }
        self.state.epochs = EpochManager::new(
            self.params.epoch_duration_secs,
            at,
            self.state.validator_snapshot(),
            self.state.sequencer_snapshot(),
        );
        Ok(())
    }

    fn register(
        &mut self,
        caller: &Address,
        role: Role,
        identity: &Address,
        stake: Stake,
        endpoint: String,
    ) -> ConsensusResult<()> {
        self.authorize(caller, identity, "register another identity")?;
        let at = self.state.block;
        self.register_participant(Participant::new(*identity, role, stake, endpoint, at, false))
    }

    fn deactivate(&mut self, caller: &Address, role: Role, identity: &Address) -> ConsensusResult<()> {
        self.authorize(caller, identity, "deactivate another participant")?;
        let participant = self.state.participant(role, identity)?;
        if participant.permanent {
            return Err(ConsensusError::CannotRemovePermanent(*identity));
        }
        if participant.status == ParticipantStatus::Deactivated {
            return Err(ConsensusError::NotActive {
                role,
                identity: *identity,
            });
        }
        self.deactivate_participant(role, identity)
    }

    fn update_stake(&mut self, caller: &Address, role: Role, identity: &Address, delta: i128) -> ConsensusResult<()> {
        self.authorize(caller, identity, "change another participant's stake")?;
        let participant = self.state.participant(role, identity)?;
        if participant.status == ParticipantStatus::Deactivated {
            return Err(ConsensusError::NotActive {
                role,
                identity: *identity,
            });
        }
        let old_stake = participant.stake;
        let permanent = participant.permanent;
        let amount = delta.unsigned_abs();

        let new_stake = if delta >= 0 {
            old_stake
                .checked_add(amount)
                .ok_or_else(|| ConsensusError::Ledger(LedgerError::Overflow(self.params.escrow)))?
        } else {
            old_stake
                .checked_sub(amount)
                .ok_or(ConsensusError::InsufficientStake {
                    required: amount,
                    available: old_stake,
                })?
        };
        if amount == 0 {
            return Ok(());
        }

        match role {
            Role::Sequencer => self.state.sequencers.set_stake(identity, new_stake)?,
            Role::Validator => self.state.validators.set_stake(identity, new_stake)?,
        }
        if delta > 0 {
            self.transfer(*identity, self.params.escrow, amount);
        } else {
            self.transfer(self.params.escrow, *identity, amount);
        }
        self.emit(ConsensusEvent::StakeUpdated {
            role,
            identity: *identity,
            old_stake,
            new_stake,
        });
        debug!(%role, identity = %identity, old_stake, new_stake, "Stake updated");

        let participant = self.state.participant(role, identity)?;
        let below_minimum = match role {
            Role::Sequencer => !self.state.sequencers.meets_minimum(participant),
            Role::Validator => !self.state.validators.meets_minimum(participant),
        };
        if below_minimum && !permanent {
            self.deactivate_participant(role, identity)?;
        }
        Ok(())
    }

    fn record_uptime(
        &mut self,
        caller: &Address,
        role: Role,
        identity: &Address,
        uptime: BasisPoints,
    ) -> ConsensusResult<()> {
        self.require_manager(caller, "report uptime")?;
        let below = self.state.slashing.check_uptime(uptime)?;
        match role {
            Role::Sequencer => self.state.sequencers.require_active(identity)?,
            Role::Validator => self.state.validators.require_active(identity)?,
        };

        let participant = self.state.participant_mut(role, identity)?;
        participant.uptime_bps = uptime;
        let permanent = participant.permanent;
        self.emit(ConsensusEvent::UptimeRecorded {
            role,
            identity: *identity,
            uptime_bps: uptime,
        });

        if below {
            warn!(%role, identity = %identity, uptime, threshold = self.state.slashing.uptime_threshold(), "Uptime below threshold");
            let record = self.slash(role, identity, Offense::Downtime)?;
            if !record.jailed && !permanent {
                self.jail(role, identity)?;
            }
            if role == Role::Sequencer {
                self.rotate_if_leader_removed(identity, RotationEndReason::LeaderJailed);
            }
        }
        Ok(())
    }

    fn unjail(&mut self, caller: &Address, role: Role, identity: &Address) -> ConsensusResult<()> {
        self.authorize(caller, identity, "unjail another participant")?;
        let now = self.now();
        let state = &mut self.state;
        match role {
            Role::Sequencer => state.slashing.unjail(&mut state.sequencers, identity, now)?,
            Role::Validator => state.slashing.unjail(&mut state.validators, identity, now)?,
        }
        self.emit(ConsensusEvent::Unjailed {
            role,
            identity: *identity,
        });
        if role == Role::Sequencer {
            self.ensure_leader();
        }
        Ok(())
    }

    fn record_block_produced(
        &mut self,
        producer: &Address,
        block_number: BlockNumber,
        block_hash: H256,
    ) -> ConsensusResult<()> {
        let now = self.now();
        let produced = self.state.rotation.record_produced(producer, now)?;
        let participant = self.state.sequencers.require_mut(producer)?;
        participant.blocks_produced += 1;
        participant.uptime_bps = participant.production_rate_bps();
        self.emit(ConsensusEvent::BlockProduced {
            producer: *producer,
            block_number,
            block_hash,
        });
        debug!(producer = %producer, block_number, produced, "Block produced");
        Ok(())
    }

    fn check_rotation(&mut self) -> ConsensusResult<bool> {
        if self.state.rotation.current().is_none() {
            return Err(ConsensusError::NoEligibleLeader);
        }
        if !self.state.rotation.interval_reached() {
            return Ok(false);
        }
        self.force_rotation(RotationEndReason::Scheduled);
        Ok(true)
    }

    fn check_timeout(&mut self) -> ConsensusResult<()> {
        let now = self.now();
        let missed = self.state.rotation.check_timeout(now)?;
        let leader = self
            .state
            .rotation
            .leader()
            .ok_or(ConsensusError::NoEligibleLeader)?;

        self.state.rotation.record_missed(missed);
        let participant = self.state.sequencers.require_mut(&leader)?;
        participant.blocks_missed += missed;
        participant.uptime_bps = participant.production_rate_bps();
        participant.timeout_count += 1;
        let timeout_count = participant.timeout_count;
        let permanent = participant.permanent;

        self.emit(ConsensusEvent::LeaderTimedOut {
            leader,
            missed_blocks: missed,
            timeout_count,
        });
        warn!(leader = %leader, missed, timeout_count, "Leader timed out");

        let record = self.slash(Role::Sequencer, &leader, Offense::Timeout)?;
        if !record.jailed && !permanent && timeout_count >= self.state.rotation.max_timeouts() {
            self.jail(Role::Sequencer, &leader)?;
        }
        self.force_rotation(RotationEndReason::Timeout);
        Ok(())
    }

    fn report_invalid_block(
        &mut self,
        reporter: &Address,
        sequencer: &Address,
        block_number: BlockNumber,
    ) -> ConsensusResult<()> {
        if !self.params.is_manager(reporter) && !self.state.validators.is_active(reporter) {
            return Err(ConsensusError::Unauthorized {
                caller: *reporter,
                action: "report an invalid block",
            });
        }
        if self.state.sequencers.require(sequencer)?.status == ParticipantStatus::Deactivated {
            return Err(ConsensusError::NotActive {
                role: Role::Sequencer,
                identity: *sequencer,
            });
        }

        self.emit(ConsensusEvent::InvalidBlockReported {
            reporter: *reporter,
            sequencer: *sequencer,
            block_number,
        });
        let record = self.slash(Role::Sequencer, sequencer, Offense::InvalidBlock)?;
        if !record.jailed {
            self.jail(Role::Sequencer, sequencer)?;
        }
        self.force_rotation(RotationEndReason::InvalidBlock);
        Ok(())
    }

    fn admin_rotate(&mut self, caller: &Address) -> ConsensusResult<()> {
        self.require_manager(caller, "force a rotation")?;
        if self.state.rotation.current().is_none() && self.state.sequencers.active_len() == 0 {
            return Err(ConsensusError::NoEligibleLeader);
        }
        self.force_rotation(RotationEndReason::Admin);
        Ok(())
    }

    fn elect_proposer(&mut self) -> ConsensusResult<Address> {
        let proposer = self.state.validators.elect_proposer()?;
        let election = self.state.validators.policy().elections();
        self.emit(ConsensusEvent::ProposerElected { proposer, election });
        Ok(proposer)
    }

    fn submit_attestation(
        &mut self,
        validator: &Address,
        block_number: BlockNumber,
        block_hash: H256,
        signature: Signature,
    ) -> ConsensusResult<SubmitOutcome> {
        let now = self.now();
        let attestation = Attestation {
            validator: *validator,
            block_number,
            block_hash,
            signature,
            voting_power: 0,
            submitted_at: now,
        };
        let state = &mut self.state;
        let outcome = state
            .attestations
            .submit(&state.validators, self.recovery, attestation, now)?;

        if let SubmitOutcome::Accepted {
            aggregate_power,
            finalized,
            conflicting,
        } = outcome
        {
            self.emit(ConsensusEvent::AttestationAccepted {
                validator: *validator,
                block_number,
                block_hash,
                aggregate_power,
            });
            if let Some(first_hash) = conflicting {
                self.emit(ConsensusEvent::EquivocationObserved {
                    validator: *validator,
                    block_number,
                    first_hash,
                    second_hash: block_hash,
                });
            }
            if finalized {
                let threshold = self.state.validators.quorum();
                self.emit(ConsensusEvent::BlockFinalized {
                    block_number,
                    block_hash,
                    aggregate_power,
                    threshold,
                });
            }
        }
        Ok(outcome)
    }

    fn report_double_sign(&mut self, evidence: &DoubleSignEvidence) -> ConsensusResult<()> {
        let evidence_hash = self.state.attestations.verify_double_sign(
            &self.state.validators,
            self.recovery,
            evidence,
            self.now(),
        )?;
        self.state
            .attestations
            .record_evidence(evidence_hash, evidence.block_number);
        self.emit(ConsensusEvent::DoubleSignProcessed {
            validator: evidence.validator,
            block_number: evidence.block_number,
            evidence_hash,
        });
        warn!(
            validator = %evidence.validator,
            block_number = evidence.block_number,
            evidence = %evidence_hash,
            "Double signing proven"
        );

        let record = self.slash(Role::Validator, &evidence.validator, Offense::DoubleSign)?;
        if !record.jailed {
            self.jail(Role::Validator, &evidence.validator)?;
        }
        Ok(())
    }

    fn advance_epoch(&mut self) -> ConsensusResult<u64> {
        let at = self.state.block;
        let validators = self.state.validator_snapshot();
        let sequencers = self.state.sequencer_snapshot();
        let (closed, opened) = self.state.epochs.advance(at, validators, sequencers)?;
        let event = ConsensusEvent::EpochAdvanced {
            epoch: opened.number,
            start_block: opened.start_block,
            start_time: opened.start_time,
            total_voting_power: opened.total_voting_power,
            validator_set_hash: opened.validator_set_hash,
        };
        let number = opened.number;
        self.appended.epochs.push(closed);
        self.emit(event);
        Ok(number)
    }

    fn request_inclusion(&mut self, requester: &Address, tx_ref: H256) -> ConsensusResult<()> {
        let now = self.now();
        self.state.inclusion.request(*requester, tx_ref, now)?;
        self.emit(ConsensusEvent::InclusionRequested {
            requester: *requester,
            tx_ref,
        });
        Ok(())
    }

    fn mark_included(&mut self, caller: &Address, tx_ref: H256) -> ConsensusResult<()> {
        let included = match self.state.inclusion.mark_included(caller, &tx_ref) {
            Err(ConsensusError::RequestNotFound(_)) => {
                return Err(match self.log.inclusions.get(&tx_ref) {
                    Some(resolved) => ConsensusError::RequestNotPending {
                        tx_ref,
                        status: resolved.status,
                    },
                    None => ConsensusError::RequestNotFound(tx_ref),
                });
            }
            result => result?,
        };
        self.appended.inclusions.push(included);
        self.emit(ConsensusEvent::InclusionConfirmed { tx_ref });
        Ok(())
    }

    fn check_inclusion_timeouts(&mut self) -> ConsensusResult<Vec<H256>> {
        let overdue = self.state.inclusion.overdue(self.now());
        if overdue.is_empty() {
            return Ok(overdue);
        }
        let leader = self
            .state
            .rotation
            .leader()
            .ok_or(ConsensusError::NoEligibleLeader)?;

        warn!(leader = %leader, expired = overdue.len(), "Force inclusion window missed");
        self.slash(Role::Sequencer, &leader, Offense::Censorship)?;
        let expired = self.state.inclusion.expire(&overdue, leader);
        self.appended.inclusions.extend(expired);
        self.emit(ConsensusEvent::CensorshipDetected {
            leader,
            tx_refs: overdue.clone(),
        });
        self.force_rotation(RotationEndReason::Censorship);
        Ok(overdue)
    }
}

/// Replays `transfers` on shadow balances, checks custody, then applies them.
fn settle<L: StakeLedger>(
    ledger: &mut L,
    params: &ConsensusParams,
    state: &CoreState,
    transfers: &[Transfer],
) -> ConsensusResult<()> {
    let mut shadow: BTreeMap<Address, Stake> = BTreeMap::new();
    for transfer in transfers {
        let from = *shadow
            .entry(transfer.from)
            .or_insert_with(|| ledger.balance_of(&transfer.from));
        if from < transfer.amount {
            if transfer.from == params.escrow {
                let message = format!(
                    "escrow {} holds {} but must release {}",
                    params.escrow, from, transfer.amount
                );
                error!(escrow = %params.escrow, balance = from, amount = transfer.amount, "Escrow cannot cover release");
                return Err(ConsensusError::InvariantViolation(message));
            }
            return Err(ConsensusError::InsufficientStake {
                required: transfer.amount,
                available: from,
            });
        }
        let to = *shadow
            .entry(transfer.to)
            .or_insert_with(|| ledger.balance_of(&transfer.to));
        let to = to
            .checked_add(transfer.amount)
            .ok_or(LedgerError::Overflow(transfer.to))?;
        shadow.insert(transfer.from, from - transfer.amount);
        shadow.insert(transfer.to, to);
    }

    let escrow = shadow
        .get(&params.escrow)
        .copied()
        .unwrap_or_else(|| ledger.balance_of(&params.escrow));
    let staked = state.total_stake();
    if escrow < staked {
        error!(
            escrow = %params.escrow,
            balance = escrow,
            staked,
            sequencer_stake = state.sequencers.total_stake(),
            validator_stake = state.validators.total_stake(),
            "Escrow balance below total stake"
        );
        return Err(ConsensusError::InvariantViolation(format!(
            "escrow balance {} below total stake {}",
            escrow, staked
        )));
    }

    for (applied, transfer) in transfers.iter().enumerate() {
        if let Err(err) = ledger.move_stake(&transfer.from, &transfer.to, transfer.amount) {
            error!(error = %err, from = %transfer.from, to = %transfer.to, amount = transfer.amount, "Ledger refused transfer; rolling back");
            for done in transfers[..applied].iter().rev() {
                if let Err(rollback) = ledger.move_stake(&done.to, &done.from, done.amount) {
                    error!(error = %rollback, "Rollback transfer failed");
                }
            }
            return Err(err.into());
        }
    }
    Ok(())
}

/// Rotation, election, attestation, slashing, epochs and force inclusion
/// over one custody ledger.
#[derive(Debug)]
pub struct ConsensusCore<L, R = EcdsaRecovery> {
    params: ConsensusParams,
    state: CoreState,
    log: CoreLog,
    ledger: L,
    recovery: R,
    outbox: Vec<ConsensusEvent>,
    metrics: Option<ConsensusMetrics>,
}

impl<L: StakeLedger> ConsensusCore<L, EcdsaRecovery> {
    /// Creates a core with secp256k1 signature recovery and no participants.
    pub fn new(params: ConsensusParams, ledger: L, at: BlockContext) -> Self {
        Self::with_recovery(params, ledger, EcdsaRecovery, at)
    }
}

impl<L: StakeLedger, R: SignerRecovery> ConsensusCore<L, R> {
    /// Creates a core with a custom signer recovery and no participants.
    pub fn with_recovery(params: ConsensusParams, ledger: L, recovery: R, at: BlockContext) -> Self {
        let state = CoreState::new(&params, at);
        Self {
            params,
            state,
            log: CoreLog::default(),
            ledger,
            recovery,
            outbox: Vec::new(),
            metrics: None,
        }
    }

    /// Creates a core and registers the genesis participants.
    ///
    /// Genesis stake moves from each participant to escrow, so the ledger must
    /// already hold the opening balances. Epoch 0 snapshots the result.
    pub fn genesis(
        params: ConsensusParams,
        ledger: L,
        recovery: R,
        at: BlockContext,
        participants: &[GenesisParticipant],
    ) -> ConsensusResult<Self> {
        let mut core = Self::with_recovery(params, ledger, recovery, at);
        core.transact("genesis", |txn| txn.bootstrap(participants))?;
        info!(
            sequencers = core.state.sequencers.len(),
            validators = core.state.validators.len(),
            leader = ?core.current_leader(),
            "Genesis applied"
        );
        Ok(core)
    }

    fn transact<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut Txn<'_, R>) -> ConsensusResult<T>,
    ) -> ConsensusResult<T> {
        let mut txn = Txn {
            state: self.state.clone(),
            params: &self.params,
            recovery: &self.recovery,
            log: &self.log,
            appended: LogDelta::default(),
            transfers: Vec::new(),
            events: Vec::new(),
        };

        let result = f(&mut txn).and_then(|value| {
            settle(&mut self.ledger, txn.params, &txn.state, &txn.transfers)?;
            Ok(value)
        });
        match result {
            Ok(value) => {
                let Txn {
                    state,
                    appended,
                    transfers,
                    mut events,
                    ..
                } = txn;
                debug!(operation, events = events.len(), transfers = transfers.len(), "Operation committed");
                self.state = state;
                self.log.append(appended);
                if let Some(metrics) = &self.metrics {
                    metrics.record_events(&events);
                    metrics.set_state(&self.state.metrics_snapshot());
                }
                self.outbox.append(&mut events);
                Ok(value)
            }
            Err(err) => {
                if err.is_invariant_violation() {
                    error!(operation, error = %err, block = %self.state.block, "Operation rejected by invariant check");
                } else {
                    debug!(operation, error = %err, "Operation rejected");
                }
                Err(err)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Applies one operation from the total order.
    pub fn apply(&mut self, operation: Operation) -> ConsensusResult<OperationOutput> {
        match operation {
            Operation::AdvanceBlock { number, timestamp } => {
                self.advance_block(BlockContext::new(number, timestamp))?;
                Ok(OperationOutput::Done)
            }
            Operation::Register {
                caller,
                role,
                identity,
                stake,
                endpoint,
            } => {
                self.register(&caller, role, &identity, stake, endpoint)?;
                Ok(OperationOutput::Done)
            }
            Operation::Deactivate {
                caller,
                role,
                identity,
            } => {
                self.deactivate(&caller, role, &identity)?;
                Ok(OperationOutput::Done)
            }
            Operation::UpdateStake {
                caller,
                role,
                identity,
                delta,
            } => {
                self.update_stake(&caller, role, &identity, delta)?;
                Ok(OperationOutput::Done)
            }
            Operation::RecordUptime {
                caller,
                role,
                identity,
                uptime_bps,
            } => {
                self.record_uptime(&caller, role, &identity, uptime_bps)?;
                Ok(OperationOutput::Done)
            }
            Operation::Unjail {
                caller,
                role,
                identity,
            } => {
                self.unjail(&caller, role, &identity)?;
                Ok(OperationOutput::Done)
            }
            Operation::RecordBlockProduced {
                producer,
                block_number,
                block_hash,
            } => {
                self.record_block_produced(&producer, block_number, block_hash)?;
                Ok(OperationOutput::Done)
            }
            Operation::CheckRotation => self.check_rotation().map(OperationOutput::Rotated),
            Operation::CheckTimeout => {
                self.check_timeout()?;
                Ok(OperationOutput::Done)
            }
            Operation::ReportInvalidBlock {
                reporter,
                sequencer,
                block_number,
            } => {
                self.report_invalid_block(&reporter, &sequencer, block_number)?;
                Ok(OperationOutput::Done)
            }
            Operation::AdminRotate { caller } => {
                self.admin_rotate(&caller)?;
                Ok(OperationOutput::Done)
            }
            Operation::ElectProposer => self.elect_proposer().map(OperationOutput::Proposer),
            Operation::SubmitAttestation {
                validator,
                block_number,
                block_hash,
                signature,
            } => self
                .submit_attestation(&validator, block_number, block_hash, signature)
                .map(OperationOutput::Attestation),
            Operation::ReportDoubleSign(evidence) => {
                self.report_double_sign(&evidence)?;
                Ok(OperationOutput::Done)
            }
            Operation::AdvanceEpoch => self.advance_epoch().map(OperationOutput::Epoch),
            Operation::RequestInclusion { requester, tx_ref } => {
                self.request_inclusion(&requester, tx_ref)?;
                Ok(OperationOutput::Done)
            }
            Operation::MarkIncluded { caller, tx_ref } => {
                self.mark_included(&caller, tx_ref)?;
                Ok(OperationOutput::Done)
            }
            Operation::CheckInclusionTimeouts => self
                .check_inclusion_timeouts()
                .map(OperationOutput::Expired),
        }
    }

    /// Moves to a later block position. Neither number nor timestamp may decrease.
    pub fn advance_block(&mut self, ctx: BlockContext) -> ConsensusResult<()> {
        let current = self.state.block;
        if ctx.number < current.number || ctx.timestamp < current.timestamp {
            return Err(ConsensusError::BlockRegression {
                current_block: current.number,
                current_time: current.timestamp,
                block: ctx.number,
                time: ctx.timestamp,
            });
        }
        self.state.block = ctx;
        self.state.attestations.prune(ctx.number);
        if let Some(metrics) = &self.metrics {
            metrics.set_state(&self.state.metrics_snapshot());
        }
        Ok(())
    }

    /// Mirrors committed state into `metrics` from now on.
    pub fn attach_metrics(&mut self, metrics: ConsensusMetrics) {
        metrics.set_state(&self.state.metrics_snapshot());
        self.metrics = Some(metrics);
    }

    /// Attached metrics.
    pub fn metrics(&self) -> Option<&ConsensusMetrics> {
        self.metrics.as_ref()
    }

    /// Registers `identity`, moving `stake` from it into escrow.
    pub fn register(
        &mut self,
        caller: &Address,
        role: Role,
        identity: &Address,
        stake: Stake,
        endpoint: impl Into<String>,
    ) -> ConsensusResult<()> {
        let endpoint = endpoint.into();
        self.transact("register", |txn| txn.register(caller, role, identity, stake, endpoint))
    }

    /// Deactivates `identity` and releases its stake.
    pub fn deactivate(&mut self, caller: &Address, role: Role, identity: &Address) -> ConsensusResult<()> {
        self.transact("deactivate", |txn| txn.deactivate(caller, role, identity))
    }

    /// Adds (`delta > 0`) or withdraws (`delta < 0`) stake.
    pub fn update_stake(&mut self, caller: &Address, role: Role, identity: &Address, delta: i128) -> ConsensusResult<()> {
        self.transact("update_stake", |txn| txn.update_stake(caller, role, identity, delta))
    }

    /// Records a manager's uptime report; low uptime is slashed and jailed.
    pub fn record_uptime(
        &mut self,
        caller: &Address,
        role: Role,
        identity: &Address,
        uptime_bps: BasisPoints,
    ) -> ConsensusResult<()> {
        self.transact("record_uptime", |txn| txn.record_uptime(caller, role, identity, uptime_bps))
    }

    /// Returns a jailed participant to the active set.
    pub fn unjail(&mut self, caller: &Address, role: Role, identity: &Address) -> ConsensusResult<()> {
        self.transact("unjail", |txn| txn.unjail(caller, role, identity))
    }

    /// Counts a block produced by the current leader.
    pub fn record_block_produced(
        &mut self,
        producer: &Address,
        block_number: BlockNumber,
        block_hash: H256,
    ) -> ConsensusResult<()> {
        self.transact("record_block_produced", |txn| {
            txn.record_block_produced(producer, block_number, block_hash)
        })
    }

    /// Rotates if the leader has produced the full interval.
    pub fn check_rotation(&mut self) -> ConsensusResult<bool> {
        self.transact("check_rotation", |txn| txn.check_rotation())
    }

    /// Slashes and replaces a leader that missed its timeout window.
    pub fn check_timeout(&mut self) -> ConsensusResult<()> {
        self.transact("check_timeout", |txn| txn.check_timeout())
    }

    /// Slashes and jails a sequencer for an invalid block, then rotates.
    pub fn report_invalid_block(
        &mut self,
        reporter: &Address,
        sequencer: &Address,
        block_number: BlockNumber,
    ) -> ConsensusResult<()> {
        self.transact("report_invalid_block", |txn| {
            txn.report_invalid_block(reporter, sequencer, block_number)
        })
    }

    /// Forces a rotation on a manager's request.
    pub fn admin_rotate(&mut self, caller: &Address) -> ConsensusResult<()> {
        self.transact("admin_rotate", |txn| txn.admin_rotate(caller))
    }

    /// Runs one weighted election.
    pub fn elect_proposer(&mut self) -> ConsensusResult<Address> {
        self.transact("elect_proposer", |txn| txn.elect_proposer())
    }

    /// Counts a validator's attestation.
    pub fn submit_attestation(
        &mut self,
        validator: &Address,
        block_number: BlockNumber,
        block_hash: H256,
        signature: Signature,
    ) -> ConsensusResult<SubmitOutcome> {
        self.transact("submit_attestation", |txn| {
            txn.submit_attestation(validator, block_number, block_hash, signature)
        })
    }

    /// Slashes and jails a validator proven to have double signed.
    pub fn report_double_sign(&mut self, evidence: &DoubleSignEvidence) -> ConsensusResult<()> {
        self.transact("report_double_sign", |txn| txn.report_double_sign(evidence))
    }

    /// Closes the epoch once its duration has elapsed; returns the new number.
    pub fn advance_epoch(&mut self) -> ConsensusResult<u64> {
        self.transact("advance_epoch", |txn| txn.advance_epoch())
    }

    /// Records a force-inclusion request.
    pub fn request_inclusion(&mut self, requester: &Address, tx_ref: H256) -> ConsensusResult<()> {
        self.transact("request_inclusion", |txn| txn.request_inclusion(requester, tx_ref))
    }

    /// Confirms inclusion; oracle only.
    pub fn mark_included(&mut self, caller: &Address, tx_ref: H256) -> ConsensusResult<()> {
        self.transact("mark_included", |txn| txn.mark_included(caller, tx_ref))
    }

    /// Charges the leader once for all requests past their window.
    pub fn check_inclusion_timeouts(&mut self) -> ConsensusResult<Vec<H256>> {
        self.transact("check_inclusion_timeouts", |txn| txn.check_inclusion_timeouts())
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Takes all buffered events.
    pub fn drain_events(&mut self) -> Vec<ConsensusEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Buffered events.
    pub fn pending_events(&self) -> &[ConsensusEvent] {
        &self.outbox
    }

    /// Runtime parameters.
    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Current block position.
    pub fn block(&self) -> BlockContext {
        self.state.block
    }

    /// Custody ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Mutable custody ledger, for deposits made outside the core.
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// Participant by role and identity.
    pub fn participant(&self, role: Role, identity: &Address) -> Option<&Participant> {
        self.state.participant(role, identity).ok()
    }

    /// Sequencer registry.
    pub fn sequencers(&self) -> &ParticipantRegistry<RoundRobin> {
        &self.state.sequencers
    }

    /// Validator registry.
    pub fn validators(&self) -> &ParticipantRegistry<WeightedElection> {
        &self.state.validators
    }

    /// Current leader.
    pub fn current_leader(&self) -> Option<Address> {
        self.state.rotation.leader()
    }

    /// Open tenure.
    pub fn current_rotation(&self) -> Option<&RotationRecord> {
        self.state.rotation.current()
    }

    /// Tenure by number.
    pub fn rotation(&self, number: u64) -> Option<&RotationRecord> {
        match self.state.rotation.current() {
            Some(open) if open.number == number => Some(open),
            _ => self.log.rotations.get(usize::try_from(number).ok()?),
        }
    }

    /// All tenures, oldest first, ending with the open one.
    pub fn rotation_history(&self) -> impl Iterator<Item = &RotationRecord> + '_ {
        self.log.rotations.iter().chain(self.state.rotation.current())
    }

    /// Most recently elected proposer.
    pub fn proposer(&self) -> Option<Address> {
        self.state.validators.policy().proposer()
    }

    /// Summed power of active validators.
    pub fn total_voting_power(&self) -> VotingPower {
        self.state.validators.total_voting_power()
    }

    /// Finality threshold for the current validator set.
    pub fn quorum_threshold(&self) -> VotingPower {
        self.state.validators.quorum()
    }

    /// Bytes a validator signs to attest a block on this chain.
    pub fn attestation_signing_bytes(&self, block_number: BlockNumber, block_hash: &H256) -> Vec<u8> {
        self.state.attestations.signing_bytes(block_number, block_hash)
    }

    /// Whether a hash has reached quorum of the current total power.
    pub fn is_finalized(&self, block_hash: &H256) -> bool {
        self.state
            .attestations
            .is_finalized(block_hash, self.total_voting_power())
    }

    /// Attestations collected for a hash.
    pub fn attestations(&self, block_hash: &H256) -> Option<&BlockAttestations> {
        self.state.attestations.attestations(block_hash)
    }

    /// Epoch by number.
    pub fn epoch(&self, number: u64) -> Option<&EpochRecord> {
        let current = self.state.epochs.current();
        if current.number == number {
            return Some(current);
        }
        self.log.epochs.get(usize::try_from(number).ok()?)
    }

    /// Open epoch.
    pub fn current_epoch(&self) -> &EpochRecord {
        self.state.epochs.current()
    }

    /// Force-inclusion request by reference, pending or last resolved.
    pub fn inclusion_request(&self, tx_ref: &H256) -> Option<&ForceInclusionRequest> {
        self.state
            .inclusion
            .get(tx_ref)
            .or_else(|| self.log.inclusions.get(tx_ref))
    }

    /// Every slash applied so far.
    pub fn slash_history(&self) -> &[SlashRecord] {
        &self.log.slashes
    }
}
