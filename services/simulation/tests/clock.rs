//! Clock tests against the in-memory repository
//!
//! - Replaying a tick never writes a second bar for the same (stock, tick)
//! - A stock left behind is caught up with a gapless bar sequence
//! - A storage failure on one stock neither halts the others nor loses
//!   the failed stock's tick
//! - Bars carry the volume traded during their tick

use async_trait::async_trait;
use persistence::{AppendOutcome, MarketLocks, MemoryRepository, Repository, TradeCommit};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use simulation::{SimulationClock, SimulationConfig};
use types::account::User;
use types::cycle::MarketCycleState;
use types::errors::RepositoryError;
use types::holding::Holding;
use types::ids::{StockId, UserId};
use types::kline::KlineBar;
use types::stock::Stock;
use types::trade::{Side, Transaction};

fn config(seed: u64) -> SimulationConfig {
    let mut config = SimulationConfig {
        seed: Some(seed),
        ..Default::default()
    };
    config.events.stock_event_probability = 0.0;
    config.events.sector_event_probability = 0.0;
    config.clock.max_catch_up_ticks = 3;
    config
}

fn stock(id: &str) -> Stock {
    Stock::new(StockId::new(id), id, Decimal::from(40), Decimal::new(25, 3), "tech", 0).unwrap()
}

async fn seeded_repo() -> Arc<MemoryRepository> {
    let repo = Arc::new(MemoryRepository::new());
    for id in ["AA", "BB", "CC"] {
        repo.insert_stock(stock(id)).await.unwrap();
    }
    repo
}

fn ticks(bars: &[KlineBar]) -> Vec<u64> {
    bars.iter().map(|b| b.tick).collect()
}

// ── Repository that fails commits for one stock on demand ───────────

struct FlakyRepository {
    inner: Arc<MemoryRepository>,
    broken: StockId,
    failing: AtomicBool,
}

#[async_trait]
impl Repository for FlakyRepository {
    async fn get_stock(&self, id: &StockId) -> Result<Option<Stock>, RepositoryError> {
        self.inner.get_stock(id).await
    }
    async fn list_stocks(&self) -> Result<Vec<Stock>, RepositoryError> {
        self.inner.list_stocks().await
    }
    async fn put_stock(&self, stock: Stock) -> Result<(), RepositoryError> {
        self.inner.put_stock(stock).await
    }
    async fn insert_stock(&self, stock: Stock) -> Result<bool, RepositoryError> {
        self.inner.insert_stock(stock).await
    }
    async fn delete_stock(&self, id: &StockId) -> Result<bool, RepositoryError> {
        self.inner.delete_stock(id).await
    }
    async fn append_kline_bar(&self, bar: KlineBar) -> Result<AppendOutcome, RepositoryError> {
        self.inner.append_kline_bar(bar).await
    }
    async fn get_kline_history(&self, id: &StockId, window: usize) -> Result<Vec<KlineBar>, RepositoryError> {
        self.inner.get_kline_history(id, window).await
    }
    async fn commit_tick(&self, stock: Stock, bars: Vec<KlineBar>) -> Result<usize, RepositoryError> {
        if stock.id == self.broken && self.failing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("disk full".into()));
        }
        self.inner.commit_tick(stock, bars).await
    }
    async fn traded_volume(&self, id: &StockId, tick: u64) -> Result<u64, RepositoryError> {
        self.inner.traded_volume(id, tick).await
    }
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        self.inner.get_user(id).await
    }
    async fn put_user(&self, user: User) -> Result<(), RepositoryError> {
        self.inner.put_user(user).await
    }
    async fn insert_user(&self, user: User) -> Result<bool, RepositoryError> {
        self.inner.insert_user(user).await
    }
    async fn list_users(&self) -> Result<Vec<User>, RepositoryError> {
        self.inner.list_users().await
    }
    async fn get_holding(&self, user_id: &UserId, stock_id: &StockId) -> Result<Option<Holding>, RepositoryError> {
        self.inner.get_holding(user_id, stock_id).await
    }
    async fn put_holding(&self, holding: Holding) -> Result<(), RepositoryError> {
        self.inner.put_holding(holding).await
    }
    async fn list_holdings(&self, user_id: &UserId) -> Result<Vec<Holding>, RepositoryError> {
        self.inner.list_holdings(user_id).await
    }
    async fn list_holders(&self, stock_id: &StockId) -> Result<Vec<Holding>, RepositoryError> {
        self.inner.list_holders(stock_id).await
    }
    async fn append_transaction(&self, tx: Transaction) -> Result<(), RepositoryError> {
        self.inner.append_transaction(tx).await
    }
    async fn list_transactions(&self, user_id: &UserId, limit: usize) -> Result<Vec<Transaction>, RepositoryError> {
        self.inner.list_transactions(user_id, limit).await
    }
    async fn get_market_cycle(&self) -> Result<Option<MarketCycleState>, RepositoryError> {
        self.inner.get_market_cycle().await
    }
    async fn put_market_cycle(&self, state: MarketCycleState) -> Result<(), RepositoryError> {
        self.inner.put_market_cycle(state).await
    }
    async fn commit_trade(&self, commit: TradeCommit) -> Result<(), RepositoryError> {
        self.inner.commit_trade(commit).await
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_replayed_tick_writes_nothing() {
    let repo = seeded_repo().await;
    let clock = SimulationClock::new(repo.clone(), Arc::new(MarketLocks::default()), config(1));
    clock.tick().await.unwrap();
    let before = repo.get_kline_history(&StockId::new("AA"), 10).await.unwrap();

    // Rewind the persisted cycle so the next tick recomputes tick 1.
    let mut cycle = repo.get_market_cycle().await.unwrap().unwrap();
    cycle.tick_index = 0;
    repo.put_market_cycle(cycle).await.unwrap();

    let report = clock.tick().await.unwrap();
    assert_eq!(report.tick, 1);
    assert_eq!(report.replayed.len(), 3);
    assert!(report.advanced.is_empty());

    let after = repo.get_kline_history(&StockId::new("AA"), 10).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_failure_is_isolated_and_retried() {
    let inner = seeded_repo().await;
    let flaky = Arc::new(FlakyRepository {
        inner: inner.clone(),
        broken: StockId::new("BB"),
        failing: AtomicBool::new(true),
    });
    let clock = SimulationClock::new(flaky.clone(), Arc::new(MarketLocks::default()), config(3));

    let report = clock.tick().await.unwrap();
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, StockId::new("BB"));
    assert_eq!(report.advanced.len(), 2);

    let report = clock.tick().await.unwrap();
    assert_eq!(report.failed.len(), 1);

    flaky.failing.store(false, Ordering::SeqCst);
    let report = clock.tick().await.unwrap();
    assert!(report.failed.is_empty());
    assert!(report.advanced.contains(&(StockId::new("BB"), 1)));

    // BB never had a bar; it starts at the tick it first succeeded.
    let bb = inner.get_kline_history(&StockId::new("BB"), 10).await.unwrap();
    assert_eq!(ticks(&bb), vec![3]);
    let aa = inner.get_kline_history(&StockId::new("AA"), 10).await.unwrap();
    assert_eq!(ticks(&aa), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_lagging_stock_catches_up_gaplessly() {
    let inner = seeded_repo().await;
    let flaky = Arc::new(FlakyRepository {
        inner: inner.clone(),
        broken: StockId::new("CC"),
        failing: AtomicBool::new(false),
    });
    let clock = SimulationClock::new(flaky.clone(), Arc::new(MarketLocks::default()), config(5));

    clock.tick().await.unwrap();
    flaky.failing.store(true, Ordering::SeqCst);
    for _ in 0..5 {
        clock.tick().await.unwrap();
    }
    flaky.failing.store(false, Ordering::SeqCst);
    let report = clock.tick().await.unwrap();
    assert_eq!(report.tick, 7);
    assert!(report.advanced.contains(&(StockId::new("CC"), 6)));

    let bars = inner.get_kline_history(&StockId::new("CC"), 100).await.unwrap();
    assert_eq!(ticks(&bars), (1..=7).collect::<Vec<_>>());

    // Ticks 2..=4 are older than the catch-up window and are flat.
    let close_1 = bars[0].close;
    for bar in &bars[1..4] {
        assert_eq!(bar.open, close_1);
        assert_eq!(bar.high, close_1);
        assert_eq!(bar.low, close_1);
        assert_eq!(bar.close, close_1);
    }
    for pair in bars.windows(2) {
        assert_eq!(pair[1].open, pair[0].close);
    }
    let cc = inner.get_stock(&StockId::new("CC")).await.unwrap().unwrap();
    assert_eq!(cc.last_tick, Some(7));
    assert_eq!(cc.current_price, bars[6].close);
}

#[tokio::test]
async fn test_bar_volume_counts_trades_of_previous_tick() {
    let repo = seeded_repo().await;
    let clock = SimulationClock::new(repo.clone(), Arc::new(MarketLocks::default()), config(9));
    clock.tick().await.unwrap();

    let user_id = UserId::new("alice");
    let mut user = User::new(user_id.clone(), Decimal::from(10_000), 0);
    repo.insert_user(user.clone()).await.unwrap();
    user.debit(Decimal::from(400), 0);
    let mut holding = Holding::new(user_id.clone(), StockId::new("AA"));
    holding.add_lot(10, Decimal::from(40), 1, 12);
    let tx = Transaction::new(
        user_id,
        StockId::new("AA"),
        Side::BUY,
        10,
        Decimal::from(40),
        Decimal::from(40),
        Decimal::ZERO,
        Decimal::ZERO,
        Decimal::from(400),
        1,
        0,
    );
    repo.commit_trade(TradeCommit { user, holding, transaction: tx }).await.unwrap();

    clock.tick().await.unwrap();
    let bars = repo.get_kline_history(&StockId::new("AA"), 10).await.unwrap();
    assert_eq!(bars[0].volume, 0);
    assert_eq!(bars[1].volume, 10);
}

#[tokio::test]
async fn test_same_seed_same_market() {
    let a = seeded_repo().await;
    let b = seeded_repo().await;
    let clock_a = SimulationClock::new(a.clone(), Arc::new(MarketLocks::default()), config(42));
    let clock_b = SimulationClock::new(b.clone(), Arc::new(MarketLocks::default()), config(42));
    for _ in 0..20 {
        clock_a.tick().await.unwrap();
        clock_b.tick().await.unwrap();
    }
    for id in ["AA", "BB", "CC"] {
        let id = StockId::new(id);
        let bars_a: Vec<_> = a.get_kline_history(&id, 50).await.unwrap().into_iter().map(|b| b.close).collect();
        let bars_b: Vec<_> = b.get_kline_history(&id, 50).await.unwrap().into_iter().map(|b| b.close).collect();
        assert_eq!(bars_a, bars_b);
    }
    assert_eq!(a.get_market_cycle().await.unwrap(), b.get_market_cycle().await.unwrap());
}
