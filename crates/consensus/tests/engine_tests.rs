//! Consensus core: genesis, stake management, authorization, atomicity,
//! operation dispatch and metrics.

use cadence_config::Config;
use cadence_consensus::{
    BlockContext, ConsensusCore, ConsensusError, ConsensusEvent, ConsensusMetrics, ConsensusParams,
    EcdsaRecovery, Genesis, GenesisParticipant, InMemoryLedger, Operation, OperationOutput,
    ParticipantStatus, StakeLedger,
};
use prometheus::Registry;
use cadence_types::{Address, Role, H256};

const MANAGER: u64 = 0xAA;

fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

fn params() -> ConsensusParams {
    ConsensusParams {
        min_sequencer_stake: 1_000,
        min_validator_stake: 100,
        stake_per_power: 10,
        managers: [addr(MANAGER)].into_iter().collect(),
        ..ConsensusParams::default()
    }
}

fn core() -> ConsensusCore<InMemoryLedger> {
    let ledger = InMemoryLedger::with_balances((1..=5).map(|n| (addr(n), 10_000)));
    ConsensusCore::new(params(), ledger, BlockContext::new(1, 100))
}

fn genesis_entry(n: u64, role: Role, stake: u128, permanent: bool) -> GenesisParticipant {
    GenesisParticipant {
        address: addr(n),
        role,
        stake,
        endpoint: String::new(),
        permanent,
    }
}

#[test]
fn test_genesis_registers_and_snapshots() {
    let ledger = InMemoryLedger::with_balances([(addr(2), 5_000), (addr(3), 5_000)]);
    let participants = vec![
        genesis_entry(1, Role::Sequencer, 0, true),
        genesis_entry(2, Role::Sequencer, 2_000, false),
        genesis_entry(3, Role::Validator, 1_000, false),
    ];
    let core = ConsensusCore::genesis(
        params(),
        ledger,
        EcdsaRecovery,
        BlockContext::new(0, 0),
        &participants,
    )
    .unwrap();

    assert_eq!(core.current_leader(), Some(addr(1)));
    assert_eq!(
        core.participant(Role::Sequencer, &addr(1)).unwrap().status,
        ParticipantStatus::Permanent
    );
    assert_eq!(core.ledger().balance_of(&core.params().escrow), 3_000);

    let epoch = core.epoch(0).unwrap();
    assert_eq!(epoch.sequencers, vec![addr(1), addr(2)]);
    assert_eq!(epoch.validators, vec![(addr(3), 100)]);
    assert_eq!(epoch.total_voting_power, 100);
}

#[test]
fn test_genesis_from_default_config() {
    let config = Config::default();
    let params = ConsensusParams::try_from(&config).unwrap();
    let genesis = Genesis::try_from(&config.genesis).unwrap();
    let ledger = InMemoryLedger::with_balances(genesis.balances.iter().copied());
    let core = ConsensusCore::genesis(
        params,
        ledger,
        EcdsaRecovery,
        BlockContext::default(),
        &genesis.participants,
    )
    .unwrap();
    assert_eq!(core.sequencers().len(), 1);
    assert!(core.current_leader().is_some());
}

#[test]
fn test_genesis_is_all_or_nothing() {
    let ledger = InMemoryLedger::with_balances([(addr(2), 500)]);
    let participants = vec![
        genesis_entry(1, Role::Sequencer, 0, true),
        genesis_entry(2, Role::Sequencer, 2_000, false),
    ];
    let err = ConsensusCore::genesis(
        params(),
        ledger,
        EcdsaRecovery,
        BlockContext::new(0, 0),
        &participants,
    )
    .unwrap_err();
    assert_eq!(
        err,
        ConsensusError::InsufficientStake {
            required: 2_000,
            available: 500
        }
    );
}

#[test]
fn test_duplicate_registration() {
    let mut core = core();
    core.register(&addr(1), Role::Sequencer, &addr(1), 1_000, "").unwrap();
    assert_eq!(
        core.register(&addr(1), Role::Sequencer, &addr(1), 1_000, ""),
        Err(ConsensusError::AlreadyRegistered {
            role: Role::Sequencer,
            identity: addr(1)
        })
    );
    // the other role is a separate registry
    core.register(&addr(1), Role::Validator, &addr(1), 100, "").unwrap();
    assert_eq!(core.ledger().balance_of(&addr(1)), 8_900);
}

#[test]
fn test_below_minimum_registration() {
    let mut core = core();
    assert_eq!(
        core.register(&addr(1), Role::Sequencer, &addr(1), 999, ""),
        Err(ConsensusError::InsufficientStake {
            required: 1_000,
            available: 999
        })
    );
}

#[test]
fn test_update_stake_and_auto_deactivate() {
    let mut core = core();
    core.register(&addr(1), Role::Validator, &addr(1), 200, "").unwrap();

    core.update_stake(&addr(1), Role::Validator, &addr(1), 300).unwrap();
    let validator = core.participant(Role::Validator, &addr(1)).unwrap();
    assert_eq!(validator.stake, 500);
    assert_eq!(validator.voting_power, 50);
    assert_eq!(core.total_voting_power(), 50);

    assert_eq!(
        core.update_stake(&addr(1), Role::Validator, &addr(1), -501),
        Err(ConsensusError::InsufficientStake {
            required: 501,
            available: 500
        })
    );

    core.update_stake(&addr(1), Role::Validator, &addr(1), -450).unwrap();
    let validator = core.participant(Role::Validator, &addr(1)).unwrap();
    assert_eq!(validator.status, ParticipantStatus::Deactivated);
    assert_eq!(validator.stake, 0);
    assert_eq!(core.total_voting_power(), 0);
    assert_eq!(core.ledger().balance_of(&addr(1)), 10_000);
    assert_eq!(core.ledger().balance_of(&core.params().escrow), 0);
}

#[test]
fn test_permanent_cannot_be_removed() {
    let ledger = InMemoryLedger::new();
    let mut core = ConsensusCore::genesis(
        params(),
        ledger,
        EcdsaRecovery,
        BlockContext::new(0, 0),
        &[genesis_entry(1, Role::Sequencer, 0, true)],
    )
    .unwrap();
    assert_eq!(
        core.deactivate(&addr(MANAGER), Role::Sequencer, &addr(1)),
        Err(ConsensusError::CannotRemovePermanent(addr(1)))
    );
    assert_eq!(
        core.deactivate(&addr(MANAGER), Role::Sequencer, &addr(7)),
        Err(ConsensusError::NotFound {
            role: Role::Sequencer,
            identity: addr(7)
        })
    );
}

#[test]
fn test_deactivated_participant_history_kept() {
    let mut core = core();
    core.register(&addr(1), Role::Sequencer, &addr(1), 1_000, "").unwrap();
    core.deactivate(&addr(1), Role::Sequencer, &addr(1)).unwrap();
    assert_eq!(core.sequencers().len(), 1);
    assert_eq!(core.sequencers().active_len(), 0);
    assert!(matches!(
        core.deactivate(&addr(1), Role::Sequencer, &addr(1)),
        Err(ConsensusError::NotActive { .. })
    ));
}

#[test]
fn test_uptime_reporting() {
    let mut core = core();
    core.register(&addr(1), Role::Validator, &addr(1), 1_000, "").unwrap();

    assert!(matches!(
        core.record_uptime(&addr(1), Role::Validator, &addr(1), 10_000),
        Err(ConsensusError::Unauthorized { .. })
    ));
    assert_eq!(
        core.record_uptime(&addr(MANAGER), Role::Validator, &addr(1), 10_001),
        Err(ConsensusError::InvalidUptime(10_001))
    );

    core.record_uptime(&addr(MANAGER), Role::Validator, &addr(1), 9_900)
        .unwrap();
    assert!(core.slash_history().is_empty());

    core.record_uptime(&addr(MANAGER), Role::Validator, &addr(1), 9_899)
        .unwrap();
    let validator = core.participant(Role::Validator, &addr(1)).unwrap();
    assert_eq!(validator.stake, 950);
    assert_eq!(validator.status, ParticipantStatus::Jailed);
    assert_eq!(validator.uptime_bps, 9_899);
}

#[test]
fn test_unjail_authorization_and_timing() {
    let mut core = core();
    core.register(&addr(1), Role::Validator, &addr(1), 1_000, "").unwrap();
    core.record_uptime(&addr(MANAGER), Role::Validator, &addr(1), 0)
        .unwrap();
    let until = core.participant(Role::Validator, &addr(1)).unwrap().jailed_until;

    assert!(matches!(
        core.unjail(&addr(2), Role::Validator, &addr(1)),
        Err(ConsensusError::Unauthorized { .. })
    ));
    assert_eq!(
        core.unjail(&addr(1), Role::Validator, &addr(1)),
        Err(ConsensusError::StillJailed {
            identity: addr(1),
            until
        })
    );

    core.advance_block(BlockContext::new(until, 10_000)).unwrap();
    core.unjail(&addr(MANAGER), Role::Validator, &addr(1)).unwrap();
    assert_eq!(core.total_voting_power(), 95);
    assert_eq!(
        core.unjail(&addr(1), Role::Validator, &addr(1)),
        Err(ConsensusError::NotJailed(addr(1)))
    );
}

#[test]
fn test_unjail_after_topping_up() {
    let mut core = core();
    core.register(&addr(1), Role::Sequencer, &addr(1), 1_000, "").unwrap();
    core.register(&addr(2), Role::Sequencer, &addr(2), 1_000, "").unwrap();
    core.report_invalid_block(&addr(MANAGER), &addr(2), 1).unwrap();
    let until = core.participant(Role::Sequencer, &addr(2)).unwrap().jailed_until;
    core.advance_block(BlockContext::new(until, 10_000)).unwrap();

    assert_eq!(
        core.unjail(&addr(2), Role::Sequencer, &addr(2)),
        Err(ConsensusError::InsufficientStake {
            required: 1_000,
            available: 500
        })
    );
    core.update_stake(&addr(2), Role::Sequencer, &addr(2), 500).unwrap();
    core.unjail(&addr(2), Role::Sequencer, &addr(2)).unwrap();
    assert!(core.sequencers().is_active(&addr(2)));
}

#[test]
fn test_rejected_operation_leaves_no_trace() {
    let mut core = core();
    core.register(&addr(1), Role::Sequencer, &addr(1), 1_000, "").unwrap();
    core.drain_events();
    let balances: Vec<_> = core
        .ledger()
        .balances()
        .map(|(a, b)| (*a, *b))
        .collect();
    let rotations: Vec<_> = core.rotation_history().cloned().collect();

    assert!(core.check_timeout().is_err());
    assert!(core.report_invalid_block(&addr(3), &addr(1), 1).is_err());
    assert!(core.unjail(&addr(1), Role::Sequencer, &addr(1)).is_err());

    let after: Vec<_> = core
        .ledger()
        .balances()
        .map(|(a, b)| (*a, *b))
        .collect();
    assert_eq!(balances, after);
    assert!(core.rotation_history().eq(rotations.iter()));
    assert!(core.pending_events().is_empty());
}

#[test]
fn test_apply_operations_from_json() {
    let mut core = core();
    let ops = format!(
        r#"[
            {{"register":{{"caller":"{a}","role":"sequencer","identity":"{a}","stake":1000,"endpoint":"http://a"}}}},
            {{"advance_block":{{"number":2,"timestamp":110}}}},
            {{"record_block_produced":{{"producer":"{a}","block_number":2,"block_hash":"{h}"}}}},
            "check_rotation"
        ]"#,
        a = addr(1),
        h = H256::from_low_u64_be(2),
    );
    let ops: Vec<Operation> = serde_json::from_str(&ops).unwrap();
    let outputs: Vec<_> = ops
        .into_iter()
        .map(|op| core.apply(op).unwrap())
        .collect();
    assert_eq!(outputs.last(), Some(&OperationOutput::Rotated(false)));
    assert_eq!(core.current_rotation().unwrap().blocks_produced, 1);

    let events = core.drain_events();
    assert!(matches!(events.last(), Some(ConsensusEvent::BlockProduced { .. })));
    let json = serde_json::to_string(&events).unwrap();
    assert!(json.contains(r#""event":"block_produced""#));
}

#[test]
fn test_permanent_sequencer_jailed_for_invalid_block() {
    let ledger = InMemoryLedger::with_balances([(addr(2), 5_000)]);
    let participants = vec![
        genesis_entry(1, Role::Sequencer, 0, true),
        genesis_entry(2, Role::Sequencer, 2_000, false),
    ];
    let mut core = ConsensusCore::genesis(
        params(),
        ledger,
        EcdsaRecovery,
        BlockContext::new(0, 0),
        &participants,
    )
    .unwrap();

    core.report_invalid_block(&addr(MANAGER), &addr(1), 0).unwrap();
    let bootstrap = core.participant(Role::Sequencer, &addr(1)).unwrap();
    assert_eq!(bootstrap.status, ParticipantStatus::Jailed);
    assert_eq!(bootstrap.jailed_until, 1_000);
    assert_eq!(core.current_leader(), Some(addr(2)));
    assert_eq!(
        core.deactivate(&addr(MANAGER), Role::Sequencer, &addr(1)),
        Err(ConsensusError::CannotRemovePermanent(addr(1)))
    );

    // stake zero still qualifies, and the permanent status comes back
    core.advance_block(BlockContext::new(1_000, 5_000)).unwrap();
    core.unjail(&addr(MANAGER), Role::Sequencer, &addr(1)).unwrap();
    assert_eq!(
        core.participant(Role::Sequencer, &addr(1)).unwrap().status,
        ParticipantStatus::Permanent
    );
}

#[test]
fn test_metrics_mirror_committed_state() {
    let registry = Registry::new();
    let metrics = ConsensusMetrics::new(&registry).unwrap();
    let mut core = core();
    core.attach_metrics(metrics.clone());
    assert_eq!(metrics.current_block.get(), 1);
    assert_eq!(metrics.current_rotation.get(), -1);
    assert_eq!(metrics.leader_uptime.get(), -1);

    core.register(&addr(1), Role::Sequencer, &addr(1), 1_000, "").unwrap();
    core.register(&addr(2), Role::Sequencer, &addr(2), 1_000, "").unwrap();
    core.register(&addr(3), Role::Validator, &addr(3), 1_000, "").unwrap();
    assert_eq!(metrics.active_sequencers.get(), 2);
    assert_eq!(metrics.active_validators.get(), 1);
    assert_eq!(metrics.total_voting_power.get(), 100);
    assert_eq!(metrics.bft_threshold.get(), 67);
    assert_eq!(metrics.current_rotation.get(), 0);

    core.advance_block(BlockContext::new(2, 110)).unwrap();
    core.record_block_produced(&addr(1), 2, H256::from_low_u64_be(2))
        .unwrap();
    assert_eq!(metrics.current_block.get(), 2);
    assert_eq!(metrics.blocks_produced.get(), 1);

    // rejected operations move nothing
    assert!(core.record_block_produced(&addr(2), 2, H256::ZERO).is_err());
    assert_eq!(metrics.blocks_produced.get(), 1);

    core.advance_block(BlockContext::new(12, 130)).unwrap();
    core.check_timeout().unwrap();
    assert_eq!(metrics.timeouts_detected.get(), 1);
    assert_eq!(metrics.blocks_missed.get(), 10);
    assert_eq!(metrics.forced_rotations.get(), 1);
    assert_eq!(metrics.slashes.get(), 1);
    assert_eq!(metrics.jailings.get(), 1);
    assert_eq!(metrics.active_sequencers.get(), 1);
    assert_eq!(metrics.current_rotation.get(), 1);
    assert_eq!(metrics.leader_uptime.get(), 10_000);

    let families = registry.gather();
    assert!(families
        .iter()
        .any(|f| f.get_name() == "cadence_consensus_timeouts_detected_total"));
}
