//! # Force Inclusion
//!
//! Users who believe the leader is censoring them can register a transaction
//! reference. The configured oracle marks it included once it lands. A request
//! still pending `window_blocks` after it was made counts as censorship by the
//! leader in charge at the time of the check.

use cadence_types::{Address, BlockNumber, H256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

use crate::error::{ConsensusError, ConsensusResult};

/// Lifecycle of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InclusionStatus {
    /// Awaiting inclusion
    Pending,
    /// Confirmed by the oracle
    Included,
    /// Window elapsed; the leader was charged
    Expired,
}

impl fmt::Display for InclusionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InclusionStatus::Pending => write!(f, "pending"),
            InclusionStatus::Included => write!(f, "included"),
            InclusionStatus::Expired => write!(f, "expired"),
        }
    }
}

/// A force-inclusion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceInclusionRequest {
    /// Who asked
    pub requester: Address,
    /// Transaction reference
    pub tx_ref: H256,
    /// Block of the request
    pub request_block: BlockNumber,
    /// Current state
    pub status: InclusionStatus,
    /// Leader charged when it expired
    pub charged_leader: Option<Address>,
}

/// Pending requests by transaction reference.
///
/// A request leaves the queue once it is resolved; the resolved record is
/// handed back to the caller to keep.
#[derive(Debug, Clone)]
pub struct ForceInclusionQueue {
    window_blocks: u64,
    oracle: Address,
    pending: BTreeMap<H256, ForceInclusionRequest>,
}

impl ForceInclusionQueue {
    /// Creates an empty queue.
    pub fn new(window_blocks: u64, oracle: Address) -> Self {
        Self {
            window_blocks,
            oracle,
            pending: BTreeMap::new(),
        }
    }

    /// Blocks a request may stay pending.
    pub fn window_blocks(&self) -> u64 {
        self.window_blocks
    }

    /// Identity allowed to confirm inclusion.
    pub fn oracle(&self) -> Address {
        self.oracle
    }

    /// Pending request by transaction reference.
    pub fn get(&self, tx_ref: &H256) -> Option<&ForceInclusionRequest> {
        self.pending.get(tx_ref)
    }

    /// Pending requests.
    pub fn pending(&self) -> impl Iterator<Item = &ForceInclusionRequest> {
        self.pending.values()
    }

    /// Records a request. A reference resolved earlier may be requested again.
    pub fn request(&mut self, requester: Address, tx_ref: H256, now: BlockNumber) -> ConsensusResult<()> {
        if self.pending.contains_key(&tx_ref) {
            return Err(ConsensusError::AlreadyRequested(tx_ref));
        }
        self.pending.insert(
            tx_ref,
            ForceInclusionRequest {
                requester,
                tx_ref,
                request_block: now,
                status: InclusionStatus::Pending,
                charged_leader: None,
            },
        );
        info!(requester = %requester, tx_ref = %tx_ref, block = now, "Force inclusion requested");
        Ok(())
    }

    /// Marks a pending request included and returns it. Only the oracle may call this.
    pub fn mark_included(&mut self, caller: &Address, tx_ref: &H256) -> ConsensusResult<ForceInclusionRequest> {
        if *caller != self.oracle {
            return Err(ConsensusError::Unauthorized {
                caller: *caller,
                action: "confirm force inclusion",
            });
        }
        let mut request = self
            .pending
            .remove(tx_ref)
            .ok_or(ConsensusError::RequestNotFound(*tx_ref))?;
        request.status = InclusionStatus::Included;
        debug!(tx_ref = %tx_ref, "Force inclusion confirmed");
        Ok(request)
    }

    /// Pending references whose window has elapsed at `now`.
    pub fn overdue(&self, now: BlockNumber) -> Vec<H256> {
        self.pending()
            .filter(|r| now >= r.request_block.saturating_add(self.window_blocks))
            .map(|r| r.tx_ref)
            .collect()
    }

    /// Expires the given requests, charges them to `leader` and returns them.
    pub fn expire(&mut self, tx_refs: &[H256], leader: Address) -> Vec<ForceInclusionRequest> {
        tx_refs
            .iter()
            .filter_map(|tx_ref| self.pending.remove(tx_ref))
            .map(|mut request| {
                request.status = InclusionStatus::Expired;
                request.charged_leader = Some(leader);
                request
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn test_duplicate_pending_request() {
        let mut queue = ForceInclusionQueue::new(50, addr(99));
        let tx = H256::keccak256(b"tx");
        queue.request(addr(1), tx, 10).unwrap();
        assert_eq!(queue.request(addr(2), tx, 11), Err(ConsensusError::AlreadyRequested(tx)));
        assert_eq!(queue.get(&tx).unwrap().requester, addr(1));
    }

    #[test]
    fn test_only_oracle_confirms() {
        let mut queue = ForceInclusionQueue::new(50, addr(99));
        let tx = H256::keccak256(b"tx");
        assert_eq!(
            queue.mark_included(&addr(99), &tx),
            Err(ConsensusError::RequestNotFound(tx))
        );
        queue.request(addr(1), tx, 10).unwrap();
        assert!(matches!(
            queue.mark_included(&addr(1), &tx),
            Err(ConsensusError::Unauthorized { .. })
        ));
        let included = queue.mark_included(&addr(99), &tx).unwrap();
        assert_eq!(included.status, InclusionStatus::Included);
        assert!(queue.get(&tx).is_none());
        assert_eq!(queue.pending().count(), 0);
        // a resolved reference may be requested again
        queue.request(addr(1), tx, 20).unwrap();
        assert_eq!(queue.get(&tx).unwrap().request_block, 20);
    }

    #[test]
    fn test_overdue_and_expire() {
        let mut queue = ForceInclusionQueue::new(50, addr(99));
        let early = H256::keccak256(b"early");
        let late = H256::keccak256(b"late");
        queue.request(addr(1), early, 10).unwrap();
        queue.request(addr(1), late, 30).unwrap();

        assert!(queue.overdue(59).is_empty());
        assert_eq!(queue.overdue(60), vec![early]);

        let expired = queue.expire(&[early], addr(7));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].status, InclusionStatus::Expired);
        assert_eq!(expired[0].charged_leader, Some(addr(7)));
        assert!(queue.overdue(79).is_empty());
        assert_eq!(queue.overdue(80), vec![late]);
    }

    #[test]
    fn test_expired_request_cannot_be_confirmed() {
        let mut queue = ForceInclusionQueue::new(50, addr(99));
        let tx = H256::keccak256(b"tx");
        queue.request(addr(1), tx, 10).unwrap();
        queue.expire(&[tx], addr(7));
        assert_eq!(
            queue.mark_included(&addr(99), &tx),
            Err(ConsensusError::RequestNotFound(tx))
        );
        // expiring twice charges nobody again
        assert!(queue.expire(&[tx], addr(8)).is_empty());
    }
}
