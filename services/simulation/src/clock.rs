//! Simulation clock
//!
//! One logical tick:
//! 1. advance the market cycle and persist it (under the cycle lock)
//! 2. roll for new events, prune expired ones
//! 3. for every listed stock, under that stock's lock: compute the next
//!    price inside its rolling price band, build its bar(s) and commit
//!    them with the new price
//!
//! Outside the trading session the run loop lets ticks pass without
//! advancing anything.
//!
//! Stocks are committed independently. A failure on one stock is logged
//! and reported; its `last_tick` stays behind so the next tick catches it
//! up. A stock whose `last_tick` already reached the tick is a replay and
//! is left untouched, which keeps bars unique per `(stock, tick)`.

use crate::config::{ClockConfig, SimulationConfig};
use crate::event_generator::EventGenerator;
use crate::market_cycle::{CycleTransition, MarketCycle};
use crate::price_model::{MarketConditions, PriceModel};
use persistence::{MarketLocks, Repository};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use types::cycle::{MacroRegime, MarketCycleState, VolatilityRegime};
use types::errors::MarketError;
use types::event::MarketEvent;
use types::ids::StockId;
use types::kline::KlineBar;
use types::session::TradingSession;
use types::time::now_nanos;

// ── Tick Report ─────────────────────────────────────────────────────

/// What one tick did.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick: u64,
    pub macro_regime: MacroRegime,
    pub volatility_regime: VolatilityRegime,
    pub transition: CycleTransition,
    pub events_emitted: usize,
    pub active_events: usize,
    /// Stocks that got new bars, with the number of bars written
    pub advanced: Vec<(StockId, usize)>,
    /// Stocks already at this tick
    pub replayed: Vec<StockId>,
    pub failed: Vec<(StockId, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StockOutcome {
    Advanced(usize),
    Replayed,
    Skipped,
}

// ── Clock ───────────────────────────────────────────────────────────

pub struct SimulationClock {
    repo: Arc<dyn Repository>,
    locks: Arc<MarketLocks>,
    price_model: PriceModel,
    event_generator: EventGenerator,
    market_cycle: MarketCycle,
    config: ClockConfig,
    session: TradingSession,
    rng: Mutex<ChaCha8Rng>,
    /// Live events; transient, rebuilt empty on restart
    event_book: Mutex<Vec<MarketEvent>>,
    /// Serializes cycle read-modify-write between ticks and admin overrides
    cycle_lock: tokio::sync::Mutex<()>,
}

impl SimulationClock {
    pub fn new(repo: Arc<dyn Repository>, locks: Arc<MarketLocks>, config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            repo,
            locks,
            price_model: PriceModel::new(config.price),
            event_generator: EventGenerator::new(config.events),
            market_cycle: MarketCycle::new(config.cycle),
            config: config.clock,
            session: config.session,
            rng: Mutex::new(rng),
            event_book: Mutex::new(Vec::new()),
            cycle_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    pub fn price_model(&self) -> &PriceModel {
        &self.price_model
    }

    pub fn session(&self) -> &TradingSession {
        &self.session
    }

    /// Run ticks on the configured interval until `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.config.tick_interval().as_secs(),
            session = self.session.enabled,
            "simulation clock started"
        );

        let mut was_open = true;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let open = self.session.is_open_now();
                    if open != was_open {
                        info!(open, "trading session changed");
                        was_open = open;
                    }
                    if !open {
                        continue;
                    }
                    match self.tick().await {
                        Ok(report) => info!(
                            tick = report.tick,
                            macro_regime = %report.macro_regime,
                            volatility_regime = %report.volatility_regime,
                            advanced = report.advanced.len(),
                            replayed = report.replayed.len(),
                            failed = report.failed.len(),
                            active_events = report.active_events,
                            "tick complete"
                        ),
                        Err(e) => warn!(error = %e, "tick skipped"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("simulation clock stopped");
                        return;
                    }
                }
            }
        }
    }

    /// Execute one logical tick.
    ///
    /// Fails only when the cycle cannot be read or persisted; per-stock
    /// failures are collected in the report.
    pub async fn tick(&self) -> Result<TickReport, MarketError> {
        let (cycle, transition, emitted, events, stocks) = {
            let _cycle_guard = self.cycle_lock.lock().await;

            let stocks = self.locks.storage("list_stocks", self.repo.list_stocks()).await?;
            let mut cycle = self.load_cycle().await?;
            let transition = self.with_rng(|rng| self.market_cycle.advance(&mut cycle, rng));
            self.locks
                .storage("put_market_cycle", self.repo.put_market_cycle(cycle))
                .await?;

            let tick = cycle.tick_index;
            let emitted = self.with_rng(|rng| self.event_generator.maybe_emit(tick, &stocks, rng));
            let emitted_count = emitted.len();
            let events = {
                let mut book = self.book();
                book.extend(emitted);
                book.retain(|e| !e.is_expired(tick));
                book.clone()
            };
            (cycle, transition, emitted_count, events, stocks)
        };

        let mut report = TickReport {
            tick: cycle.tick_index,
            macro_regime: cycle.macro_regime,
            volatility_regime: cycle.volatility_regime,
            transition,
            events_emitted: emitted,
            active_events: events.len(),
            advanced: Vec::new(),
            replayed: Vec::new(),
            failed: Vec::new(),
        };

        let now = now_nanos();
        for stock in stocks.into_iter().filter(|s| s.listed) {
            let outcome = self.advance_stock(&stock.id, &cycle, &events, now).await;
            match outcome {
                Ok(StockOutcome::Advanced(bars)) => report.advanced.push((stock.id, bars)),
                Ok(StockOutcome::Replayed) => report.replayed.push(stock.id),
                Ok(StockOutcome::Skipped) => {}
                Err(e) => {
                    warn!(tick = report.tick, stock_id = %stock.id, error = %e, "stock update failed, will retry next tick");
                    report.failed.push((stock.id, e.to_string()));
                }
            }
        }

        Ok(report)
    }

    /// Bring one stock up to `cycle.tick_index`.
    async fn advance_stock(
        &self,
        id: &StockId,
        cycle: &MarketCycleState,
        events: &[MarketEvent],
        now: i64,
    ) -> Result<StockOutcome, MarketError> {
        let _guard = self.locks.lock_stock(id).await?;

        let Some(mut stock) = self.locks.storage("get_stock", self.repo.get_stock(id)).await? else {
            return Ok(StockOutcome::Skipped);
        };
        if !stock.listed {
            return Ok(StockOutcome::Skipped);
        }

        let target = cycle.tick_index;
        let first = match stock.last_tick {
            Some(last) if last >= target => return Ok(StockOutcome::Replayed),
            Some(last) => last + 1,
            None => target,
        };
        let backfill = self.config.max_backfill_ticks.max(1);
        let start = first.max((target + 1).saturating_sub(backfill));
        if start > first {
            warn!(stock_id = %id, skipped = start - first, "gap longer than the backfill limit, starting a fresh series");
        }
        let simulated = self.config.max_catch_up_ticks.max(1);
        let simulate_from = start.max((target + 1).saturating_sub(simulated));
        if simulate_from > start {
            debug!(stock_id = %id, from = start, to = simulate_from - 1, "backfilling flat bars");
        }

        let config = self.price_model.config();
        let lookback = config.window_limit_ticks.max(config.daily_limit_ticks);
        let mut closes: Vec<_> = if start > first {
            Vec::new()
        } else {
            self.locks
                .storage("get_kline_history", self.repo.get_kline_history(id, lookback))
                .await?
                .into_iter()
                .map(|bar| bar.close)
                .collect()
        };

        let interval_nanos = i64::try_from(self.config.tick_interval().as_nanos()).unwrap_or(i64::MAX);
        let mut bars = Vec::with_capacity((target - start + 1) as usize);
        for t in start..=target {
            let volume = self
                .locks
                .storage("traded_volume", self.repo.traded_volume(id, t))
                .await?;
            let lag = i64::try_from(target - t).unwrap_or(i64::MAX);
            let timestamp = now.saturating_sub(lag.saturating_mul(interval_nanos));

            let mut bar = if t < simulate_from {
                KlineBar::flat(stock.id.clone(), t, timestamp, stock.current_price)
            } else {
                let conditions = MarketConditions {
                    macro_regime: cycle.macro_regime,
                    volatility_regime: cycle.volatility_regime,
                    events,
                    tick: t,
                };
                let band = self.price_model.band_from_closes(&closes);
                let step = self.with_rng(|rng| self.price_model.next_step(&stock, &conditions, &band, rng));
                step.apply_to(&mut stock);
                KlineBar {
                    stock_id: stock.id.clone(),
                    tick: t,
                    timestamp,
                    open: step.open,
                    high: step.high,
                    low: step.low,
                    close: step.close,
                    volume: 0,
                }
            };
            bar.volume = volume;
            closes.push(bar.close);
            if closes.len() > lookback {
                closes.remove(0);
            }
            bars.push(bar);
        }

        stock.last_tick = Some(target);
        let price = stock.current_price;
        let appended = self
            .locks
            .storage("commit_tick", self.repo.commit_tick(stock, bars))
            .await?;
        if appended == 0 {
            return Ok(StockOutcome::Replayed);
        }
        debug!(tick = target, stock_id = %id, price = %price, bars = appended, "stock advanced");
        Ok(StockOutcome::Advanced(appended))
    }

    // ── Admin overrides ─────────────────────────────────────────────

    /// Replace the macro regime now and reset its countdown.
    pub async fn force_regime(&self, regime: MacroRegime) -> Result<MarketCycleState, MarketError> {
        let _cycle_guard = self.cycle_lock.lock().await;
        let mut cycle = self.load_cycle().await?;
        let from = cycle.macro_regime;
        self.with_rng(|rng| self.market_cycle.force_regime(&mut cycle, regime, rng));
        self.locks
            .storage("put_market_cycle", self.repo.put_market_cycle(cycle))
            .await?;
        info!(from = %from, to = %regime, remaining = cycle.ticks_remaining_in_regime, "macro regime forced");
        Ok(cycle)
    }

    /// Replace the volatility regime now and reset its countdown.
    pub async fn force_volatility(&self, regime: VolatilityRegime) -> Result<MarketCycleState, MarketError> {
        let _cycle_guard = self.cycle_lock.lock().await;
        let mut cycle = self.load_cycle().await?;
        self.with_rng(|rng| self.market_cycle.force_volatility(&mut cycle, regime, rng));
        self.locks
            .storage("put_market_cycle", self.repo.put_market_cycle(cycle))
            .await?;
        info!(to = %regime, remaining = cycle.ticks_remaining_in_volatility, "volatility regime forced");
        Ok(cycle)
    }

    /// Add an event to the live book; it applies from the next tick on.
    pub fn inject_event(&self, event: MarketEvent) {
        info!(scope = ?event.scope, magnitude = event.magnitude, decay_ticks = event.decay_ticks, "market event injected");
        self.book().push(event);
    }

    pub fn active_events(&self) -> Vec<MarketEvent> {
        self.book().clone()
    }

    /// The persisted cycle, or the initial state if none exists yet.
    pub async fn current_cycle(&self) -> Result<MarketCycleState, MarketError> {
        let stored = self
            .locks
            .storage("get_market_cycle", self.repo.get_market_cycle())
            .await?;
        Ok(stored.unwrap_or_default())
    }

    async fn load_cycle(&self) -> Result<MarketCycleState, MarketError> {
        let stored = self
            .locks
            .storage("get_market_cycle", self.repo.get_market_cycle())
            .await?;
        Ok(match stored {
            Some(cycle) => cycle,
            None => self.with_rng(|rng| self.market_cycle.initial_state(rng)),
        })
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut ChaCha8Rng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut rng)
    }

    fn book(&self) -> std::sync::MutexGuard<'_, Vec<MarketEvent>> {
        self.event_book.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistence::MemoryRepository;
    use rust_decimal::Decimal;
    use types::stock::Stock;

    fn quiet_config() -> SimulationConfig {
        let mut config = SimulationConfig {
            seed: Some(7),
            ..Default::default()
        };
        config.events.stock_event_probability = 0.0;
        config.events.sector_event_probability = 0.0;
        config
    }

    async fn setup(config: SimulationConfig) -> (Arc<MemoryRepository>, SimulationClock) {
        let repo = Arc::new(MemoryRepository::new());
        for (id, sector) in [("ZY", "tech"), ("HL", "pharma")] {
            let stock = Stock::new(StockId::new(id), id, Decimal::from(50), Decimal::new(2, 2), sector, 0).unwrap();
            repo.insert_stock(stock).await.unwrap();
        }
        let clock = SimulationClock::new(repo.clone(), Arc::new(MarketLocks::default()), config);
        (repo, clock)
    }

    #[tokio::test]
    async fn test_tick_appends_one_bar_per_listed_stock() {
        let (repo, clock) = setup(quiet_config()).await;

        let report = clock.tick().await.unwrap();
        assert_eq!(report.tick, 1);
        assert_eq!(report.advanced.len(), 2);
        assert!(report.failed.is_empty());

        let bars = repo.get_kline_history(&StockId::new("ZY"), 10).await.unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].tick, 1);
        assert_eq!(bars[0].open, Decimal::from(50));
        let stock = repo.get_stock(&StockId::new("ZY")).await.unwrap().unwrap();
        assert_eq!(stock.current_price, bars[0].close);
        assert_eq!(stock.last_tick, Some(1));
    }

    #[tokio::test]
    async fn test_delisted_stock_is_frozen() {
        let (repo, clock) = setup(quiet_config()).await;
        let mut hl = repo.get_stock(&StockId::new("HL")).await.unwrap().unwrap();
        hl.listed = false;
        repo.put_stock(hl).await.unwrap();

        clock.tick().await.unwrap();
        assert!(repo.get_kline_history(&StockId::new("HL"), 10).await.unwrap().is_empty());
        assert_eq!(repo.get_kline_history(&StockId::new("ZY"), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_force_regime_persists() {
        let (repo, clock) = setup(quiet_config()).await;
        let cycle = clock.force_regime(MacroRegime::Bear).await.unwrap();
        assert_eq!(cycle.macro_regime, MacroRegime::Bear);
        assert_eq!(repo.get_market_cycle().await.unwrap().unwrap().macro_regime, MacroRegime::Bear);

        let report = clock.tick().await.unwrap();
        assert_eq!(report.macro_regime, MacroRegime::Bear);
    }

    #[tokio::test]
    async fn test_expired_events_are_pruned() {
        let (_repo, clock) = setup(quiet_config()).await;
        clock.inject_event(MarketEvent::new(
            types::event::EventScope::Sector("tech".into()),
            types::event::EventKind::Manual,
            0.01,
            2,
            1,
        ));

        assert_eq!(clock.tick().await.unwrap().active_events, 1);
        assert_eq!(clock.tick().await.unwrap().active_events, 1);
        assert_eq!(clock.tick().await.unwrap().active_events, 0);
        assert!(clock.active_events().is_empty());
    }

    #[tokio::test]
    async fn test_backfill_is_bounded() {
        let mut config = quiet_config();
        config.clock.max_backfill_ticks = 5;
        let (repo, clock) = setup(config).await;
        clock.tick().await.unwrap();

        // Push the cycle far ahead so ZY has a long gap to cover.
        let mut cycle = repo.get_market_cycle().await.unwrap().unwrap();
        cycle.tick_index = 40;
        repo.put_market_cycle(cycle).await.unwrap();
        let report = clock.tick().await.unwrap();
        assert_eq!(report.tick, 41);
        assert!(report.advanced.contains(&(StockId::new("ZY"), 5)));

        let bars = repo.get_kline_history(&StockId::new("ZY"), 100).await.unwrap();
        assert_eq!(bars.iter().map(|b| b.tick).collect::<Vec<_>>(), vec![37, 38, 39, 40, 41]);
        let zy = repo.get_stock(&StockId::new("ZY")).await.unwrap().unwrap();
        assert_eq!(zy.last_tick, Some(41));
    }

    #[tokio::test]
    async fn test_timestamps_are_spaced_by_interval() {
        let (repo, clock) = setup(quiet_config()).await;
        let mut zy = repo.get_stock(&StockId::new("ZY")).await.unwrap().unwrap();
        for _ in 0..3 {
            clock.tick().await.unwrap();
        }
        // Rewind ZY so the next tick backfills three bars in one commit.
        zy.last_tick = Some(0);
        let fresh = Arc::new(MemoryRepository::new());
        fresh.insert_stock(zy).await.unwrap();
        fresh.put_market_cycle(repo.get_market_cycle().await.unwrap().unwrap()).await.unwrap();
        let clock = SimulationClock::new(fresh.clone(), Arc::new(MarketLocks::default()), quiet_config());
        clock.tick().await.unwrap();

        let bars = fresh.get_kline_history(&StockId::new("ZY"), 10).await.unwrap();
        assert_eq!(bars.iter().map(|b| b.tick).collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        let spacing = 300 * 1_000_000_000i64;
        for pair in bars.windows(2) {
            assert_eq!(pair[1].timestamp - pair[0].timestamp, spacing);
        }
    }
}
