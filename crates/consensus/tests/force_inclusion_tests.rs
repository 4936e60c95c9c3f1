//! Force-inclusion requests and the censorship penalty.

use cadence_consensus::{
    BlockContext, ConsensusCore, ConsensusError, ConsensusParams, InMemoryLedger, InclusionStatus,
    Offense, RotationEndReason, StakeLedger,
};
use cadence_types::{Address, Role, H256};

const ORACLE: u64 = 0x0C;

fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

fn ctx(number: u64) -> BlockContext {
    BlockContext::new(number, number * 2)
}

fn core(sequencers: u64) -> ConsensusCore<InMemoryLedger> {
    let params = ConsensusParams {
        min_sequencer_stake: 100,
        inclusion_window_blocks: 50,
        inclusion_oracle: addr(ORACLE),
        // keep the leader from timing out while we wait on windows
        timeout_blocks: 90,
        ..ConsensusParams::default()
    };
    let ledger = InMemoryLedger::with_balances((1..=5).map(|n| (addr(n), 10_000)));
    let mut core = ConsensusCore::new(params, ledger, ctx(1));
    for n in 1..=sequencers {
        core.register(&addr(n), Role::Sequencer, &addr(n), 1_000, "").unwrap();
    }
    core
}

#[test]
fn test_duplicate_pending_request() {
    let mut core = core(1);
    let tx = H256::keccak256(b"tx-1");
    core.request_inclusion(&addr(5), tx).unwrap();
    assert_eq!(
        core.request_inclusion(&addr(4), tx),
        Err(ConsensusError::AlreadyRequested(tx))
    );
}

#[test]
fn test_oracle_marks_included() {
    let mut core = core(1);
    let tx = H256::keccak256(b"tx-1");
    core.request_inclusion(&addr(5), tx).unwrap();

    assert!(matches!(
        core.mark_included(&addr(5), tx),
        Err(ConsensusError::Unauthorized { .. })
    ));
    let unknown = H256::keccak256(b"unknown");
    assert_eq!(
        core.mark_included(&addr(ORACLE), unknown),
        Err(ConsensusError::RequestNotFound(unknown))
    );

    core.mark_included(&addr(ORACLE), tx).unwrap();
    assert_eq!(
        core.inclusion_request(&tx).unwrap().status,
        InclusionStatus::Included
    );

    core.advance_block(ctx(100)).unwrap();
    assert!(core.check_inclusion_timeouts().unwrap().is_empty());
    assert!(core.slash_history().is_empty());
}

#[test]
fn test_expired_requests_charge_leader_once() {
    let mut core = core(2);
    let treasury = core.params().treasury;
    let first = H256::keccak256(b"tx-1");
    let second = H256::keccak256(b"tx-2");
    core.request_inclusion(&addr(5), first).unwrap();
    core.request_inclusion(&addr(5), second).unwrap();

    core.advance_block(ctx(50)).unwrap();
    assert!(core.check_inclusion_timeouts().unwrap().is_empty());

    core.advance_block(ctx(51)).unwrap();
    let mut expired = core.check_inclusion_timeouts().unwrap();
    expired.sort();
    let mut expected = vec![first, second];
    expected.sort();
    assert_eq!(expired, expected);

    // one slash for both requests, one rotation
    let slashes = core.slash_history();
    assert_eq!(slashes.len(), 1);
    assert_eq!(slashes[0].offense, Offense::Censorship);
    assert_eq!(slashes[0].offender, addr(1));
    assert_eq!(slashes[0].amount, 50);
    assert_eq!(core.ledger().balance_of(&treasury), 50);
    assert_eq!(core.current_leader(), Some(addr(2)));
    assert_eq!(
        core.rotation(0).unwrap().end_reason,
        Some(RotationEndReason::Censorship)
    );

    let request = core.inclusion_request(&first).unwrap();
    assert_eq!(request.status, InclusionStatus::Expired);
    assert_eq!(request.charged_leader, Some(addr(1)));

    // never charged again
    core.advance_block(ctx(80)).unwrap();
    assert!(core.check_inclusion_timeouts().unwrap().is_empty());
    assert_eq!(core.slash_history().len(), 1);
    assert_eq!(core.current_leader(), Some(addr(2)));
}

#[test]
fn test_expiry_without_leader_is_rejected_atomically() {
    let mut core = core(0);
    let tx = H256::keccak256(b"tx-1");
    core.request_inclusion(&addr(5), tx).unwrap();
    core.advance_block(ctx(60)).unwrap();
    assert_eq!(
        core.check_inclusion_timeouts(),
        Err(ConsensusError::NoEligibleLeader)
    );
    assert_eq!(
        core.inclusion_request(&tx).unwrap().status,
        InclusionStatus::Pending
    );
}

#[test]
fn test_expired_request_cannot_be_marked_included() {
    let mut core = core(2);
    let tx = H256::keccak256(b"tx-1");
    core.request_inclusion(&addr(5), tx).unwrap();
    core.advance_block(ctx(51)).unwrap();
    assert_eq!(core.check_inclusion_timeouts().unwrap(), vec![tx]);
    core.drain_events();

    assert_eq!(
        core.mark_included(&addr(ORACLE), tx),
        Err(ConsensusError::RequestNotPending {
            tx_ref: tx,
            status: InclusionStatus::Expired
        })
    );
    let request = core.inclusion_request(&tx).unwrap();
    assert_eq!(request.status, InclusionStatus::Expired);
    assert_eq!(request.charged_leader, Some(addr(1)));
    assert!(core.pending_events().is_empty());
}

#[test]
fn test_included_request_cannot_be_confirmed_twice() {
    let mut core = core(1);
    let tx = H256::keccak256(b"tx-1");
    core.request_inclusion(&addr(5), tx).unwrap();
    core.mark_included(&addr(ORACLE), tx).unwrap();
    assert_eq!(
        core.mark_included(&addr(ORACLE), tx),
        Err(ConsensusError::RequestNotPending {
            tx_ref: tx,
            status: InclusionStatus::Included
        })
    );

    // a fresh request for the same reference is pending again
    core.request_inclusion(&addr(5), tx).unwrap();
    assert_eq!(
        core.inclusion_request(&tx).unwrap().status,
        InclusionStatus::Pending
    );
    core.mark_included(&addr(ORACLE), tx).unwrap();
}
