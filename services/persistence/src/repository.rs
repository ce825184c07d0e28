//! Repository interface
//!
//! The durable store behind the market. Single-key reads and writes are
//! atomic; the two multi-entity writes the market needs are exposed as
//! explicit commit units:
//! - [`Repository::commit_trade`]: user cash + holding + transaction + traded volume
//! - [`Repository::commit_tick`]: one stock's new price + its new bars
//!
//! Read-modify-write sequences are serialized by the caller with
//! [`MarketLocks`](crate::locks::MarketLocks); the repository itself never
//! blocks on a lock held across an await.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use types::cycle::MarketCycleState;
use types::errors::RepositoryError;
use types::holding::Holding;
use types::ids::{StockId, UserId};
use types::kline::KlineBar;
use types::stock::Stock;
use types::account::User;
use types::trade::Transaction;

/// Result of appending a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// A bar with this tick already exists; nothing was written
    Duplicate,
}

/// Everything one trade writes, committed all-or-nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeCommit {
    pub user: User,
    /// Removed from storage when its quantity is zero
    pub holding: Holding,
    pub transaction: Transaction,
}

impl TradeCommit {
    /// Check that the three rows belong together.
    pub fn validate(&self) -> Result<(), RepositoryError> {
        let tx = &self.transaction;
        if tx.user_id != self.user.id || self.holding.user_id != self.user.id {
            return Err(RepositoryError::Conflict(format!(
                "trade commit mixes users {} / {} / {}",
                self.user.id, self.holding.user_id, tx.user_id
            )));
        }
        if tx.stock_id != self.holding.stock_id {
            return Err(RepositoryError::Conflict(format!(
                "trade commit mixes stocks {} / {}",
                self.holding.stock_id, tx.stock_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    // ── Stocks ──────────────────────────────────────────────────────

    async fn get_stock(&self, id: &StockId) -> Result<Option<Stock>, RepositoryError>;

    /// All stocks, listed or not, ordered by id.
    async fn list_stocks(&self) -> Result<Vec<Stock>, RepositoryError>;

    /// Overwrite an existing stock row.
    async fn put_stock(&self, stock: Stock) -> Result<(), RepositoryError>;

    /// Insert a new stock; returns `false` if the id is taken.
    async fn insert_stock(&self, stock: Stock) -> Result<bool, RepositoryError>;

    /// Remove a stock with its bars, volume counters and every holding of it.
    async fn delete_stock(&self, id: &StockId) -> Result<bool, RepositoryError>;

    // ── K-lines ─────────────────────────────────────────────────────

    /// Append one bar. Bars must arrive in tick order without gaps;
    /// a bar whose tick is already stored is reported as a duplicate.
    async fn append_kline_bar(&self, bar: KlineBar) -> Result<AppendOutcome, RepositoryError>;

    /// The most recent `window` bars, oldest first.
    async fn get_kline_history(
        &self,
        id: &StockId,
        window: usize,
    ) -> Result<Vec<KlineBar>, RepositoryError>;

    /// Atomically store a stock's new price and append its bars.
    ///
    /// Bars already stored are skipped. When the first new bar does not
    /// follow the stored history, that history is dropped and the batch
    /// starts a fresh series; a gap inside the batch is a conflict.
    /// Returns the number appended; zero means the tick was a replay and
    /// the stock row was left untouched.
    async fn commit_tick(&self, stock: Stock, bars: Vec<KlineBar>) -> Result<usize, RepositoryError>;

    /// Shares of `id` traded during `tick`.
    async fn traded_volume(&self, id: &StockId, tick: u64) -> Result<u64, RepositoryError>;

    // ── Users ───────────────────────────────────────────────────────

    async fn get_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    async fn put_user(&self, user: User) -> Result<(), RepositoryError>;

    /// Insert a new user; returns `false` if already registered.
    async fn insert_user(&self, user: User) -> Result<bool, RepositoryError>;

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError>;

    // ── Holdings ────────────────────────────────────────────────────

    async fn get_holding(
        &self,
        user_id: &UserId,
        stock_id: &StockId,
    ) -> Result<Option<Holding>, RepositoryError>;

    /// Store a holding; a zero-quantity holding is removed.
    async fn put_holding(&self, holding: Holding) -> Result<(), RepositoryError>;

    async fn list_holdings(&self, user_id: &UserId) -> Result<Vec<Holding>, RepositoryError>;

    /// Every non-empty holding of `stock_id`, ordered by user id.
    async fn list_holders(&self, stock_id: &StockId) -> Result<Vec<Holding>, RepositoryError>;

    // ── Transactions ────────────────────────────────────────────────

    async fn append_transaction(&self, tx: Transaction) -> Result<(), RepositoryError>;

    /// A user's transactions, most recent first.
    async fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<Transaction>, RepositoryError>;

    // ── Market cycle ────────────────────────────────────────────────

    async fn get_market_cycle(&self) -> Result<Option<MarketCycleState>, RepositoryError>;

    async fn put_market_cycle(&self, state: MarketCycleState) -> Result<(), RepositoryError>;

    // ── Trades ──────────────────────────────────────────────────────

    /// Write user, holding and transaction as one unit and count the
    /// traded shares toward the stock's open bar (`transaction.tick + 1`).
    async fn commit_trade(&self, commit: TradeCommit) -> Result<(), RepositoryError>;
}
