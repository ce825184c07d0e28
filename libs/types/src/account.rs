//! User cash accounts
//!
//! Cash is only moved by ledger trades: buys debit, sells credit.
//! Invariant: `cash_balance >= 0`.

use crate::ids::UserId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub cash_balance: Decimal,
    pub created_at: i64,
    pub updated_at: i64,
    /// Bumped on every committed mutation
    pub version: u64,
}

impl User {
    pub fn new(id: UserId, initial_cash: Decimal, timestamp: i64) -> Self {
        Self {
            id,
            cash_balance: initial_cash,
            created_at: timestamp,
            updated_at: timestamp,
            version: 0,
        }
    }

    pub fn can_afford(&self, amount: Decimal) -> bool {
        self.cash_balance >= amount
    }

    /// Debit cash.
    ///
    /// # Panics
    /// Panics if the debit would overdraw the account
    pub fn debit(&mut self, amount: Decimal, timestamp: i64) {
        assert!(amount >= Decimal::ZERO, "Debit amount must be non-negative");
        assert!(self.can_afford(amount), "Debit would overdraw cash balance");
        self.cash_balance -= amount;
        self.touch(timestamp);
    }

    /// Credit cash (trade settlement)
    pub fn credit(&mut self, amount: Decimal, timestamp: i64) {
        assert!(amount >= Decimal::ZERO, "Credit amount must be non-negative");
        self.cash_balance += amount;
        self.touch(timestamp);
    }

    fn touch(&mut self, timestamp: i64) {
        self.updated_at = timestamp;
        self.version += 1;
    }
}
