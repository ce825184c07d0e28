//! In-memory repository
//!
//! All state lives in one `MarketState` behind a tokio `RwLock`. Every
//! repository call takes the lock once and never awaits while holding it,
//! so each call (including the two commit units) is atomic.
//!
//! Writes are validated, turned into a [`Mutation`], appended to the
//! journal (when one is attached) and only then applied. Replaying the
//! journal with [`MarketState::apply`] rebuilds the same state.
//!
//! `BTreeMap` everywhere keeps iteration order and snapshot bytes
//! deterministic.

use crate::journal::{JournalMark, JournalWriter};
use crate::repository::{AppendOutcome, Repository, TradeCommit};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use types::account::User;
use types::cycle::MarketCycleState;
use types::errors::RepositoryError;
use types::holding::Holding;
use types::ids::{StockId, UserId};
use types::kline::KlineBar;
use types::stock::Stock;
use types::time::now_nanos;
use types::trade::Transaction;

/// Default number of bars kept per stock (about a month of 5-minute ticks).
pub const DEFAULT_KLINE_RETENTION: usize = 9000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryRepositoryConfig {
    /// Maximum bars retained per stock; oldest are dropped first
    pub kline_retention: usize,
}

impl Default for MemoryRepositoryConfig {
    fn default() -> Self {
        Self {
            kline_retention: DEFAULT_KLINE_RETENTION,
        }
    }
}

// ── Mutations ───────────────────────────────────────────────────────

/// One validated state change, as written to the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    PutStock(Stock),
    InsertStock(Stock),
    DeleteStock(StockId),
    AppendBar(KlineBar),
    CommitTick {
        stock: Stock,
        /// Only bars not already stored
        bars: Vec<KlineBar>,
        /// Drop the stored history before appending
        reset: bool,
    },
    PutUser(User),
    InsertUser(User),
    PutHolding(Holding),
    AppendTransaction(Transaction),
    PutCycle(MarketCycleState),
    CommitTrade(TradeCommit),
}

impl Mutation {
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::PutStock(_) => "put_stock",
            Mutation::InsertStock(_) => "insert_stock",
            Mutation::DeleteStock(_) => "delete_stock",
            Mutation::AppendBar(_) => "append_bar",
            Mutation::CommitTick { .. } => "commit_tick",
            Mutation::PutUser(_) => "put_user",
            Mutation::InsertUser(_) => "insert_user",
            Mutation::PutHolding(_) => "put_holding",
            Mutation::AppendTransaction(_) => "append_transaction",
            Mutation::PutCycle(_) => "put_cycle",
            Mutation::CommitTrade(_) => "commit_trade",
        }
    }
}

// ── Market State ────────────────────────────────────────────────────

/// Full market state, also the snapshot payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    pub stocks: BTreeMap<StockId, Stock>,
    pub klines: BTreeMap<StockId, VecDeque<KlineBar>>,
    pub users: BTreeMap<UserId, User>,
    pub holdings: BTreeMap<UserId, BTreeMap<StockId, Holding>>,
    pub transactions: BTreeMap<UserId, Vec<Transaction>>,
    /// stock -> tick -> shares traded
    pub traded_volume: BTreeMap<StockId, BTreeMap<u64, u64>>,
    pub cycle: Option<MarketCycleState>,
}

impl MarketState {
    /// Deterministic SHA-256 of the bincode-encoded state.
    pub fn compute_hash(&self) -> Result<String, RepositoryError> {
        let bytes =
            bincode::serialize(self).map_err(|e| RepositoryError::Snapshot(e.to_string()))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Tick index of the last completed tick.
    pub fn tick_index(&self) -> u64 {
        self.cycle.map(|c| c.tick_index).unwrap_or(0)
    }

    /// Apply an already validated mutation.
    pub fn apply(&mut self, mutation: Mutation, retention: usize) {
        match mutation {
            Mutation::PutStock(stock) | Mutation::InsertStock(stock) => {
                self.stocks.insert(stock.id.clone(), stock);
            }
            Mutation::DeleteStock(id) => {
                self.stocks.remove(&id);
                self.klines.remove(&id);
                self.traded_volume.remove(&id);
                for holdings in self.holdings.values_mut() {
                    holdings.remove(&id);
                }
                self.holdings.retain(|_, h| !h.is_empty());
            }
            Mutation::AppendBar(bar) => self.push_bar(bar, retention),
            Mutation::CommitTick { stock, bars, reset } => {
                if reset {
                    self.klines.remove(&stock.id);
                }
                if let Some(newest) = bars.last().map(|b| b.tick) {
                    if let Some(volumes) = self.traded_volume.get_mut(&stock.id) {
                        volumes.retain(|&tick, _| tick > newest);
                    }
                }
                for bar in bars {
                    self.push_bar(bar, retention);
                }
                self.stocks.insert(stock.id.clone(), stock);
            }
            Mutation::PutUser(user) | Mutation::InsertUser(user) => {
                self.users.insert(user.id.clone(), user);
            }
            Mutation::PutHolding(holding) => self.store_holding(holding),
            Mutation::AppendTransaction(tx) => {
                self.transactions.entry(tx.user_id.clone()).or_default().push(tx);
            }
            Mutation::PutCycle(cycle) => self.cycle = Some(cycle),
            Mutation::CommitTrade(TradeCommit {
                user,
                holding,
                transaction,
            }) => {
                *self
                    .traded_volume
                    .entry(transaction.stock_id.clone())
                    .or_default()
                    .entry(transaction.tick + 1)
                    .or_insert(0) += transaction.quantity;
                self.users.insert(user.id.clone(), user);
                self.store_holding(holding);
                self.transactions
                    .entry(transaction.user_id.clone())
                    .or_default()
                    .push(transaction);
            }
        }
    }

    fn last_bar_tick(&self, id: &StockId) -> Option<u64> {
        self.klines.get(id).and_then(|bars| bars.back()).map(|b| b.tick)
    }

    /// Check where `tick` may go in a stock's bar sequence.
    fn check_bar_order(last: Option<u64>, tick: u64) -> Result<AppendOutcome, RepositoryError> {
        match last {
            Some(last) if tick <= last => Ok(AppendOutcome::Duplicate),
            Some(last) if tick != last + 1 => Err(RepositoryError::Conflict(format!(
                "kline gap: last tick {last}, got {tick}"
            ))),
            _ => Ok(AppendOutcome::Appended),
        }
    }

    fn push_bar(&mut self, bar: KlineBar, retention: usize) {
        let bars = self.klines.entry(bar.stock_id.clone()).or_default();
        bars.push_back(bar);
        while bars.len() > retention.max(1) {
            bars.pop_front();
        }
    }

    fn store_holding(&mut self, holding: Holding) {
        if holding.is_empty() {
            if let Some(user_holdings) = self.holdings.get_mut(&holding.user_id) {
                user_holdings.remove(&holding.stock_id);
                if user_holdings.is_empty() {
                    self.holdings.remove(&holding.user_id);
                }
            }
            return;
        }
        self.holdings
            .entry(holding.user_id.clone())
            .or_default()
            .insert(holding.stock_id.clone(), holding);
    }
}

// ── Memory Repository ───────────────────────────────────────────────

pub struct MemoryRepository {
    state: RwLock<MarketState>,
    config: MemoryRepositoryConfig,
    journal: Option<Mutex<JournalWriter>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::with_config(MemoryRepositoryConfig::default())
    }

    pub fn with_config(config: MemoryRepositoryConfig) -> Self {
        Self::from_state(MarketState::default(), config)
    }

    /// Rehydrate from a restored snapshot.
    pub fn from_state(state: MarketState, config: MemoryRepositoryConfig) -> Self {
        info!(
            stocks = state.stocks.len(),
            users = state.users.len(),
            kline_retention = config.kline_retention,
            "MemoryRepository initialized"
        );
        Self {
            state: RwLock::new(state),
            config,
            journal: None,
        }
    }

    /// Journal every write to `writer` before applying it.
    pub fn with_journal(mut self, writer: JournalWriter) -> Self {
        self.journal = Some(Mutex::new(writer));
        self
    }

    pub fn is_journaled(&self) -> bool {
        self.journal.is_some()
    }

    /// Consistent copy of the whole state.
    pub async fn export_state(&self) -> MarketState {
        self.state.read().await.clone()
    }

    /// Copy the state and seal the journal at the same point.
    ///
    /// Everything in the returned state is covered by segments older than
    /// the mark, which [`release_journal`](Self::release_journal) deletes
    /// once the snapshot is on disk.
    pub async fn checkpoint(&self) -> Result<(MarketState, Option<JournalMark>), RepositoryError> {
        let state = self.state.read().await;
        let mark = match &self.journal {
            Some(journal) => Some(lock_journal(journal)?.seal()?),
            None => None,
        };
        Ok((state.clone(), mark))
    }

    /// Drop journal segments covered by a snapshot taken at `mark`.
    pub fn release_journal(&self, mark: JournalMark) -> Result<usize, RepositoryError> {
        match &self.journal {
            Some(journal) => Ok(lock_journal(journal)?.release(mark)?),
            None => Ok(0),
        }
    }

    /// Journal `mutation`, then apply it. The journal write is flushed
    /// before the change becomes visible.
    fn record(&self, state: &mut MarketState, mutation: Mutation) -> Result<(), RepositoryError> {
        if let Some(journal) = &self.journal {
            let payload = bincode::serialize(&mutation)
                .map_err(|e| RepositoryError::Unavailable(format!("journal: {e}")))?;
            lock_journal(journal)?.append(now_nanos(), mutation.kind(), payload)?;
        }
        state.apply(mutation, self.config.kline_retention);
        Ok(())
    }
}

fn lock_journal(journal: &Mutex<JournalWriter>) -> Result<MutexGuard<'_, JournalWriter>, RepositoryError> {
    journal
        .lock()
        .map_err(|_| RepositoryError::Unavailable("journal writer poisoned".into()))
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_stock(&self, id: &StockId) -> Result<Option<Stock>, RepositoryError> {
        Ok(self.state.read().await.stocks.get(id).cloned())
    }

    async fn list_stocks(&self) -> Result<Vec<Stock>, RepositoryError> {
        Ok(self.state.read().await.stocks.values().cloned().collect())
    }

    async fn put_stock(&self, stock: Stock) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if !state.stocks.contains_key(&stock.id) {
            return Err(RepositoryError::NotFound {
                entity: "stock",
                key: stock.id.to_string(),
            });
        }
        self.record(&mut state, Mutation::PutStock(stock))
    }

    async fn insert_stock(&self, stock: Stock) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        if state.stocks.contains_key(&stock.id) {
            return Ok(false);
        }
        self.record(&mut state, Mutation::InsertStock(stock))?;
        Ok(true)
    }

    async fn delete_stock(&self, id: &StockId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.stocks.contains_key(id) {
            return Ok(false);
        }
        self.record(&mut state, Mutation::DeleteStock(id.clone()))?;
        Ok(true)
    }

    async fn append_kline_bar(&self, bar: KlineBar) -> Result<AppendOutcome, RepositoryError> {
        let mut state = self.state.write().await;
        let outcome = MarketState::check_bar_order(state.last_bar_tick(&bar.stock_id), bar.tick)?;
        if outcome == AppendOutcome::Appended {
            self.record(&mut state, Mutation::AppendBar(bar))?;
        }
        Ok(outcome)
    }

    async fn get_kline_history(
        &self,
        id: &StockId,
        window: usize,
    ) -> Result<Vec<KlineBar>, RepositoryError> {
        let state = self.state.read().await;
        let Some(bars) = state.klines.get(id) else {
            return Ok(Vec::new());
        };
        let skip = bars.len().saturating_sub(window);
        Ok(bars.iter().skip(skip).cloned().collect())
    }

    async fn commit_tick(&self, stock: Stock, bars: Vec<KlineBar>) -> Result<usize, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.stocks.contains_key(&stock.id) {
            return Err(RepositoryError::NotFound {
                entity: "stock",
                key: stock.id.to_string(),
            });
        }

        // Validate the whole batch before writing anything.
        let mut last = state.last_bar_tick(&stock.id);
        let mut reset = false;
        let mut fresh = Vec::with_capacity(bars.len());
        for bar in bars {
            if bar.stock_id != stock.id {
                return Err(RepositoryError::Conflict(format!(
                    "bar for {} in tick commit of {}",
                    bar.stock_id, stock.id
                )));
            }
            let leading_gap = fresh.is_empty() && last.is_some_and(|l| bar.tick > l + 1);
            if leading_gap {
                warn!(
                    stock_id = %stock.id,
                    last = ?last,
                    tick = bar.tick,
                    "history older than the retention window replaced"
                );
                reset = true;
                last = None;
            }
            if MarketState::check_bar_order(last, bar.tick)? == AppendOutcome::Appended {
                last = Some(bar.tick);
                fresh.push(bar);
            }
        }

        if fresh.is_empty() {
            debug!(stock_id = %stock.id, "tick commit was a replay, nothing written");
            return Ok(0);
        }

        let appended = fresh.len();
        self.record(
            &mut state,
            Mutation::CommitTick {
                stock,
                bars: fresh,
                reset,
            },
        )?;
        Ok(appended)
    }

    async fn traded_volume(&self, id: &StockId, tick: u64) -> Result<u64, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .traded_volume
            .get(id)
            .and_then(|v| v.get(&tick))
            .copied()
            .unwrap_or(0))
    }

    async fn get_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.read().await.users.get(id).cloned())
    }

    async fn put_user(&self, user: User) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        self.record(&mut state, Mutation::PutUser(user))
    }

    async fn insert_user(&self, user: User) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        if state.users.contains_key(&user.id) {
            return Ok(false);
        }
        self.record(&mut state, Mutation::InsertUser(user))?;
        Ok(true)
    }

    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self.state.read().await.users.values().cloned().collect())
    }

    async fn get_holding(
        &self,
        user_id: &UserId,
        stock_id: &StockId,
    ) -> Result<Option<Holding>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .holdings
            .get(user_id)
            .and_then(|h| h.get(stock_id))
            .cloned())
    }

    async fn put_holding(&self, holding: Holding) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        self.record(&mut state, Mutation::PutHolding(holding))
    }

    async fn list_holdings(&self, user_id: &UserId) -> Result<Vec<Holding>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .holdings
            .get(user_id)
            .map(|h| h.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_holders(&self, stock_id: &StockId) -> Result<Vec<Holding>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .holdings
            .values()
            .filter_map(|h| h.get(stock_id).cloned())
            .collect())
    }

    async fn append_transaction(&self, tx: Transaction) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        self.record(&mut state, Mutation::AppendTransaction(tx))
    }

    async fn list_transactions(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> Result<Vec<Transaction>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .get(user_id)
            .map(|log| log.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_market_cycle(&self) -> Result<Option<MarketCycleState>, RepositoryError> {
        Ok(self.state.read().await.cycle)
    }

    async fn put_market_cycle(&self, cycle: MarketCycleState) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        self.record(&mut state, Mutation::PutCycle(cycle))
    }

    async fn commit_trade(&self, commit: TradeCommit) -> Result<(), RepositoryError> {
        commit.validate()?;
        let mut state = self.state.write().await;
        if !state.users.contains_key(&commit.user.id) {
            return Err(RepositoryError::NotFound {
                entity: "user",
                key: commit.user.id.to_string(),
            });
        }
        self.record(&mut state, Mutation::CommitTrade(commit))
    }
}
