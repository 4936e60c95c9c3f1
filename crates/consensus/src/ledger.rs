//! Custody of the staked asset.
//!
//! The core never holds funds. It asks a [`StakeLedger`] for balances and
//! instructs it to move stake between participants, the escrow account and the
//! treasury. [`InMemoryLedger`] is the reference implementation.

use cadence_types::{Address, Stake};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::trace;

/// Errors raised by a stake ledger
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Source account cannot cover the movement
    #[error("insufficient balance in {account}: has {balance}, needs {amount}")]
    InsufficientBalance {
        /// Debited account
        account: Address,
        /// Its balance
        balance: Stake,
        /// Amount requested
        amount: Stake,
    },

    /// Destination balance would overflow
    #[error("balance overflow in {0}")]
    Overflow(Address),
}

/// Balance queries and stake movements on the external token ledger.
pub trait StakeLedger {
    /// Current balance of `account`.
    fn balance_of(&self, account: &Address) -> Stake;

    /// Moves `amount` from `from` to `to`, all or nothing.
    fn move_stake(&mut self, from: &Address, to: &Address, amount: Stake) -> Result<(), LedgerError>;
}

/// Ledger held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    balances: BTreeMap<Address, Stake>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger with opening balances.
    pub fn with_balances(balances: impl IntoIterator<Item = (Address, Stake)>) -> Self {
        let mut ledger = Self::new();
        for (account, amount) in balances {
            ledger.credit(account, amount);
        }
        ledger
    }

    /// Adds funds to an account, saturating at the maximum.
    pub fn credit(&mut self, account: Address, amount: Stake) {
        let balance = self.balances.entry(account).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Every non-zero balance, ordered by account.
    pub fn balances(&self) -> impl Iterator<Item = (&Address, &Stake)> {
        self.balances.iter().filter(|(_, b)| **b > 0)
    }
}

impl StakeLedger for InMemoryLedger {
    fn balance_of(&self, account: &Address) -> Stake {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn move_stake(&mut self, from: &Address, to: &Address, amount: Stake) -> Result<(), LedgerError> {
        if amount == 0 || from == to {
            return Ok(());
        }

        let from_balance = self.balance_of(from);
        if from_balance < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *from,
                balance: from_balance,
                amount,
            });
        }
        let to_balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow(*to))?;

        self.balances.insert(*from, from_balance - amount);
        self.balances.insert(*to, to_balance);
        trace!(from = %from, to = %to, amount, "Stake moved");
        Ok(())
    }
}
