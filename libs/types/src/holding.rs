//! Share holdings with lock-up lots
//!
//! Shares bought at tick T carry a lock entry that keeps them unsellable
//! until tick T + lock_duration.
//!
//! Invariants:
//! - sum of still-locked `lock_entries` quantities <= `quantity`
//! - a holding is removed from storage when `quantity` reaches zero

use crate::errors::MarketError;
use crate::ids::{StockId, UserId};
use crate::numeric::round_avg_cost;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A lot that becomes sellable at `unlock_tick`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    pub quantity: u64,
    pub unlock_tick: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub user_id: UserId,
    pub stock_id: StockId,
    pub quantity: u64,
    /// Quantity-weighted average purchase price (4 dp)
    pub avg_cost: Decimal,
    /// Ordered by unlock tick
    pub lock_entries: Vec<LockEntry>,
}

impl Holding {
    pub fn new(user_id: UserId, stock_id: StockId) -> Self {
        Self {
            user_id,
            stock_id,
            quantity: 0,
            avg_cost: Decimal::ZERO,
            lock_entries: Vec::new(),
        }
    }

    /// Shares still locked at `tick`.
    pub fn locked_at(&self, tick: u64) -> u64 {
        self.lock_entries
            .iter()
            .filter(|e| e.unlock_tick > tick)
            .map(|e| e.quantity)
            .sum()
    }

    /// Shares sellable at `tick`.
    pub fn unlocked_at(&self, tick: u64) -> u64 {
        self.quantity.saturating_sub(self.locked_at(tick))
    }

    /// Earliest unlock tick after `tick`, if any shares are still locked.
    pub fn next_unlock_tick(&self, tick: u64) -> Option<u64> {
        self.lock_entries
            .iter()
            .map(|e| e.unlock_tick)
            .filter(|&t| t > tick)
            .min()
    }

    /// Drop entries whose lock has expired.
    pub fn prune_expired(&mut self, tick: u64) {
        self.lock_entries.retain(|e| e.unlock_tick > tick);
    }

    /// Add a lot bought during `tick` that unlocks `lock_ticks` later,
    /// and recompute the running average cost. Expired entries are pruned.
    pub fn add_lot(&mut self, quantity: u64, price: Decimal, tick: u64, lock_ticks: u64) {
        self.prune_expired(tick);
        let held = Decimal::from(self.quantity);
        let bought = Decimal::from(quantity);
        let total = held + bought;
        if total > Decimal::ZERO {
            self.avg_cost = round_avg_cost((self.avg_cost * held + price * bought) / total);
        }
        self.quantity += quantity;
        if quantity > 0 {
            self.lock_entries.push(LockEntry {
                quantity,
                unlock_tick: tick.saturating_add(lock_ticks),
            });
            self.lock_entries.sort_by_key(|e| e.unlock_tick);
        }
    }

    /// Check that `quantity` shares can be sold at `tick`.
    pub fn check_sellable(&self, quantity: u64, tick: u64) -> Result<(), MarketError> {
        if quantity > self.quantity {
            return Err(MarketError::InsufficientShares {
                requested: quantity,
                held: self.quantity,
            });
        }
        let unlocked = self.unlocked_at(tick);
        if quantity > unlocked {
            return Err(MarketError::LockedShares {
                requested: quantity,
                unlocked,
                next_unlock_tick: self.next_unlock_tick(tick),
            });
        }
        Ok(())
    }

    /// Remove `quantity` unlocked shares; avg_cost is unchanged.
    pub fn reduce(&mut self, quantity: u64, tick: u64) -> Result<(), MarketError> {
        self.check_sellable(quantity, tick)?;
        self.prune_expired(tick);
        self.quantity -= quantity;
        if self.quantity == 0 {
            self.avg_cost = Decimal::ZERO;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.quantity == 0
    }

    pub fn cost_basis(&self) -> Decimal {
        self.avg_cost * Decimal::from(self.quantity)
    }

    /// Check the lock invariant at `tick`.
    pub fn check_invariant(&self, tick: u64) -> bool {
        self.locked_at(tick) <= self.quantity
    }
}
