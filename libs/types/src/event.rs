//! Transient market events
//!
//! An event biases the per-tick return of the stocks in its scope. Its
//! bias decays linearly from `magnitude` at creation to zero after
//! `decay_ticks`.

use crate::ids::{EventId, StockId};
use crate::stock::Stock;
use serde::{Deserialize, Serialize};

/// Which stocks an event applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventScope {
    Stock(StockId),
    Sector(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    IndustryNews,
    Partnership,
    Breakthrough,
    Downgrade,
    Scandal,
    ProductRecall,
    /// Injected by an operator
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    pub id: EventId,
    pub scope: EventScope,
    pub kind: EventKind,
    /// Signed per-tick return bias at creation (0.01 = +1%)
    pub magnitude: f64,
    pub decay_ticks: u64,
    pub created_tick: u64,
}

impl MarketEvent {
    pub fn new(
        scope: EventScope,
        kind: EventKind,
        magnitude: f64,
        decay_ticks: u64,
        created_tick: u64,
    ) -> Self {
        Self {
            id: EventId::new(),
            scope,
            kind,
            magnitude,
            decay_ticks: decay_ticks.max(1),
            created_tick,
        }
    }

    /// Bias contributed at `tick`, linearly decayed.
    pub fn current_magnitude(&self, tick: u64) -> f64 {
        if tick < self.created_tick || self.is_expired(tick) {
            return 0.0;
        }
        let age = (tick - self.created_tick) as f64;
        self.magnitude * (1.0 - age / self.decay_ticks as f64)
    }

    pub fn is_expired(&self, tick: u64) -> bool {
        tick >= self.created_tick + self.decay_ticks
    }

    pub fn applies_to(&self, stock: &Stock) -> bool {
        match &self.scope {
            EventScope::Stock(id) => *id == stock.id,
            EventScope::Sector(sector) => *sector == stock.sector,
        }
    }
}
