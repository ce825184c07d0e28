//! Admin surface
//!
//! Operator controls over the simulated market: regimes, listings,
//! fundamentals and events. Stock edits take the stock lock, so they
//! never interleave with a tick or a trade on the same stock; regime
//! overrides go through the clock's cycle lock.

use crate::clock::SimulationClock;
use crate::listings::default_listings;
use persistence::{MarketLocks, Repository};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use types::cycle::{MacroRegime, MarketCycleState, VolatilityRegime};
use types::errors::{MarketError, ValidationError};
use types::event::{EventKind, EventScope, MarketEvent};
use types::ids::StockId;
use types::stock::{validate_price, Stock, StockPatch};
use types::time::now_nanos;

/// Request to list a new stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStock {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub base_volatility: Decimal,
    pub sector: String,
}

pub struct MarketAdmin {
    repo: Arc<dyn Repository>,
    locks: Arc<MarketLocks>,
    clock: Arc<SimulationClock>,
}

impl MarketAdmin {
    pub fn new(repo: Arc<dyn Repository>, locks: Arc<MarketLocks>, clock: Arc<SimulationClock>) -> Self {
        Self { repo, locks, clock }
    }

    // ── Regimes ─────────────────────────────────────────────────────

    pub async fn force_regime(&self, regime: MacroRegime) -> Result<MarketCycleState, MarketError> {
        self.clock.force_regime(regime).await
    }

    pub async fn force_volatility(&self, regime: VolatilityRegime) -> Result<MarketCycleState, MarketError> {
        self.clock.force_volatility(regime).await
    }

    // ── Listings ────────────────────────────────────────────────────

    /// List a new stock. It gets its first bar on the next tick.
    pub async fn add_stock(&self, request: NewStock) -> Result<Stock, MarketError> {
        let id = parse_stock_id(&request.id)?;
        let stock = Stock::new(
            id,
            request.name,
            request.price,
            request.base_volatility,
            request.sector,
            now_nanos(),
        )?;

        let _guard = self.locks.lock_stock(&stock.id).await?;
        let inserted = self
            .locks
            .storage("insert_stock", self.repo.insert_stock(stock.clone()))
            .await?;
        if !inserted {
            return Err(ValidationError::DuplicateStock {
                stock_id: stock.id.to_string(),
            }
            .into());
        }
        info!(stock_id = %stock.id, price = %stock.current_price, sector = %stock.sector, "stock listed");
        Ok(stock)
    }

    /// Delist a stock. Its price freezes and it stops trading; holdings,
    /// bars and history stay readable.
    pub async fn remove_stock(&self, id: &StockId) -> Result<Stock, MarketError> {
        let _guard = self.locks.lock_stock(id).await?;
        let mut stock = self.load_stock(id).await?;
        if stock.listed {
            stock.listed = false;
            self.locks
                .storage("put_stock", self.repo.put_stock(stock.clone()))
                .await?;
            info!(stock_id = %id, price = %stock.current_price, "stock delisted");
        }
        Ok(stock)
    }

    /// Delete a stock together with its bars and every holding of it.
    /// Transaction history is kept.
    pub async fn purge_stock(&self, id: &StockId) -> Result<(), MarketError> {
        let _guard = self.locks.lock_stock(id).await?;
        let deleted = self
            .locks
            .storage("delete_stock", self.repo.delete_stock(id))
            .await?;
        if !deleted {
            return Err(unknown_stock(id));
        }
        info!(stock_id = %id, "stock purged");
        Ok(())
    }

    /// Apply a patch to a stock; the next tick opens from the patched price.
    pub async fn adjust_stock(&self, id: &StockId, patch: StockPatch) -> Result<Stock, MarketError> {
        if patch.is_empty() {
            return Err(ValidationError::InvalidField("empty patch".into()).into());
        }
        let _guard = self.locks.lock_stock(id).await?;
        let mut stock = self.load_stock(id).await?;
        stock.apply_patch(&patch)?;
        self.locks
            .storage("put_stock", self.repo.put_stock(stock.clone()))
            .await?;
        info!(
            stock_id = %id,
            price = %stock.current_price,
            volatility = %stock.base_volatility,
            listed = stock.listed,
            "stock adjusted"
        );
        Ok(stock)
    }

    // ── Fundamentals ────────────────────────────────────────────────

    /// Re-anchor the value the price reverts toward. The price itself is
    /// left alone and drifts there over the following ticks.
    pub async fn set_fundamental_value(&self, id: &StockId, value: Decimal) -> Result<Stock, MarketError> {
        let value = validate_price(value)?;
        let _guard = self.locks.lock_stock(id).await?;
        let mut stock = self.load_stock(id).await?;
        let from = stock.fundamental_value;
        stock.fundamental_value = value;
        self.locks
            .storage("put_stock", self.repo.put_stock(stock.clone()))
            .await?;
        info!(stock_id = %id, from = %from, to = %value, "fundamental value set");
        Ok(stock)
    }

    /// Move the fundamental value by an earnings surprise. `modifier` is
    /// actual over expected earnings, so 1.0 changes nothing.
    pub async fn report_earnings(&self, id: &StockId, modifier: Decimal) -> Result<Stock, MarketError> {
        if modifier <= Decimal::ZERO || modifier > Decimal::TEN {
            return Err(ValidationError::InvalidField(format!("earnings modifier {modifier}")).into());
        }
        let _guard = self.locks.lock_stock(id).await?;
        let mut stock = self.load_stock(id).await?;
        let from = stock.fundamental_value;
        stock.fundamental_value = self.clock.price_model().earnings_value(from, modifier);
        self.locks
            .storage("put_stock", self.repo.put_stock(stock.clone()))
            .await?;
        info!(
            stock_id = %id,
            modifier = %modifier,
            from = %from,
            to = %stock.fundamental_value,
            "earnings reported"
        );
        Ok(stock)
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Inject a manual event. It starts at full magnitude on the next tick.
    pub async fn inject_event(
        &self,
        scope: EventScope,
        magnitude: f64,
        decay_ticks: u64,
    ) -> Result<MarketEvent, MarketError> {
        if !magnitude.is_finite() || magnitude.abs() >= 1.0 {
            return Err(ValidationError::InvalidField(format!("magnitude {magnitude}")).into());
        }
        if decay_ticks == 0 {
            return Err(ValidationError::InvalidField("decay_ticks must be positive".into()).into());
        }

        match &scope {
            EventScope::Stock(id) => {
                self.load_stock(id).await?;
            }
            EventScope::Sector(sector) => {
                let stocks = self.locks.storage("list_stocks", self.repo.list_stocks()).await?;
                if !stocks.iter().any(|s| &s.sector == sector) {
                    return Err(ValidationError::InvalidField(format!("unknown sector {sector}")).into());
                }
            }
        }

        let cycle = self.clock.current_cycle().await?;
        let event = MarketEvent::new(scope, EventKind::Manual, magnitude, decay_ticks, cycle.tick_index + 1);
        self.clock.inject_event(event.clone());
        Ok(event)
    }

    pub fn list_events(&self) -> Vec<MarketEvent> {
        self.clock.active_events()
    }

    /// Seed the default listings into an empty market. Returns how many
    /// stocks were added.
    pub async fn seed_default_listings(&self) -> Result<usize, MarketError> {
        let existing = self.locks.storage("list_stocks", self.repo.list_stocks()).await?;
        if !existing.is_empty() {
            return Ok(0);
        }
        let mut added = 0;
        for stock in default_listings(now_nanos())? {
            if self
                .locks
                .storage("insert_stock", self.repo.insert_stock(stock))
                .await?
            {
                added += 1;
            }
        }
        info!(added, "default listings seeded");
        Ok(added)
    }

    async fn load_stock(&self, id: &StockId) -> Result<Stock, MarketError> {
        self.locks
            .storage("get_stock", self.repo.get_stock(id))
            .await?
            .ok_or_else(|| unknown_stock(id))
    }
}

pub fn parse_stock_id(raw: &str) -> Result<StockId, ValidationError> {
    StockId::try_new(raw).ok_or_else(|| ValidationError::InvalidStockId(raw.to_string()))
}

fn unknown_stock(id: &StockId) -> MarketError {
    ValidationError::UnknownStock {
        stock_id: id.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use persistence::MemoryRepository;

    fn setup() -> (Arc<MemoryRepository>, MarketAdmin) {
        let repo = Arc::new(MemoryRepository::new());
        let locks = Arc::new(MarketLocks::default());
        let config = SimulationConfig {
            seed: Some(1),
            ..Default::default()
        };
        let clock = Arc::new(SimulationClock::new(repo.clone(), locks.clone(), config));
        (repo.clone(), MarketAdmin::new(repo, locks, clock))
    }

    fn new_stock(id: &str) -> NewStock {
        NewStock {
            id: id.into(),
            name: "Test".into(),
            price: Decimal::from(20),
            base_volatility: Decimal::new(3, 2),
            sector: "tech".into(),
        }
    }

    #[tokio::test]
    async fn test_add_stock_rejects_duplicates() {
        let (_repo, admin) = setup();
        let stock = admin.add_stock(new_stock("ab")).await.unwrap();
        assert_eq!(stock.id.as_str(), "AB");

        let err = admin.add_stock(new_stock("AB")).await.unwrap_err();
        assert_eq!(err.code(), "ALREADY_EXISTS");
    }

    #[tokio::test]
    async fn test_add_stock_validates() {
        let (_repo, admin) = setup();
        let mut bad = new_stock("AB");
        bad.price = Decimal::ZERO;
        assert!(matches!(
            admin.add_stock(bad).await,
            Err(MarketError::Validation(ValidationError::InvalidPrice(_)))
        ));
        assert!(matches!(
            admin.add_stock(new_stock("no-dash")).await,
            Err(MarketError::Validation(ValidationError::InvalidStockId(_)))
        ));
    }

    #[tokio::test]
    async fn test_remove_stock_delists_but_keeps_row() {
        let (repo, admin) = setup();
        admin.add_stock(new_stock("AB")).await.unwrap();
        let stock = admin.remove_stock(&StockId::new("AB")).await.unwrap();
        assert!(!stock.listed);
        assert!(!repo.get_stock(&StockId::new("AB")).await.unwrap().unwrap().listed);

        let err = admin.remove_stock(&StockId::new("ZZ")).await.unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_STOCK");
    }

    #[tokio::test]
    async fn test_purge_deletes() {
        let (repo, admin) = setup();
        admin.add_stock(new_stock("AB")).await.unwrap();
        admin.purge_stock(&StockId::new("AB")).await.unwrap();
        assert!(repo.get_stock(&StockId::new("AB")).await.unwrap().is_none());
        assert!(admin.purge_stock(&StockId::new("AB")).await.is_err());
    }

    #[tokio::test]
    async fn test_adjust_stock() {
        let (_repo, admin) = setup();
        admin.add_stock(new_stock("AB")).await.unwrap();

        let patch = StockPatch {
            current_price: Some(Decimal::new(2550, 2)),
            ..Default::default()
        };
        let stock = admin.adjust_stock(&StockId::new("AB"), patch).await.unwrap();
        assert_eq!(stock.current_price, Decimal::new(2550, 2));

        let err = admin
            .adjust_stock(&StockId::new("AB"), StockPatch::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let bad = StockPatch {
            base_volatility: Some(Decimal::from(2)),
            ..Default::default()
        };
        assert!(admin.adjust_stock(&StockId::new("AB"), bad).await.is_err());
    }

    #[tokio::test]
    async fn test_fundamental_value_and_earnings() {
        let (repo, admin) = setup();
        admin.add_stock(new_stock("AB")).await.unwrap();
        let id = StockId::new("AB");

        let stock = admin.set_fundamental_value(&id, Decimal::new(40004, 3)).await.unwrap();
        assert_eq!(stock.fundamental_value, Decimal::new(4000, 2));
        assert_eq!(stock.current_price, Decimal::from(20));

        // A 20% beat at sensitivity 0.5 lifts the value by 10%.
        let stock = admin.report_earnings(&id, Decimal::new(12, 1)).await.unwrap();
        assert_eq!(stock.fundamental_value, Decimal::from(44));
        let stored = repo.get_stock(&id).await.unwrap().unwrap();
        assert_eq!(stored.fundamental_value, Decimal::from(44));

        assert!(admin.set_fundamental_value(&id, Decimal::ZERO).await.is_err());
        assert!(admin.report_earnings(&id, Decimal::ZERO).await.is_err());
        let err = admin.report_earnings(&StockId::new("ZZ"), Decimal::ONE).await.unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_STOCK");
    }

    #[tokio::test]
    async fn test_inject_event_validates_scope() {
        let (_repo, admin) = setup();
        admin.add_stock(new_stock("AB")).await.unwrap();

        let event = admin
            .inject_event(EventScope::Sector("tech".into()), -0.02, 5)
            .await
            .unwrap();
        assert_eq!(event.created_tick, 1);
        assert_eq!(admin.list_events().len(), 1);

        assert!(admin.inject_event(EventScope::Sector("mining".into()), 0.01, 5).await.is_err());
        assert!(admin.inject_event(EventScope::Stock(StockId::new("ZZ")), 0.01, 5).await.is_err());
        assert!(admin.inject_event(EventScope::Stock(StockId::new("AB")), 1.5, 5).await.is_err());
    }

    #[tokio::test]
    async fn test_seed_only_into_empty_market() {
        let (_repo, admin) = setup();
        assert_eq!(admin.seed_default_listings().await.unwrap(), 6);
        assert_eq!(admin.seed_default_listings().await.unwrap(), 0);
    }
}
