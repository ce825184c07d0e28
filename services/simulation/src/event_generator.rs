//! Market event generator
//!
//! Each tick, every sector and every listed stock independently rolls
//! against a small probability. A hit draws an event kind from a weighted
//! table (small positive news common, large negative shocks rare), a
//! magnitude uniformly inside that kind's range, and a decay window.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};
use types::event::{EventKind, EventScope, MarketEvent};
use types::stock::Stock;

/// One row of the event table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTemplate {
    pub kind: EventKind,
    pub min_magnitude: f64,
    pub max_magnitude: f64,
    pub weight: u32,
}

impl EventTemplate {
    pub fn new(kind: EventKind, min_magnitude: f64, max_magnitude: f64, weight: u32) -> Self {
        Self {
            kind,
            min_magnitude,
            max_magnitude,
            weight,
        }
    }
}

/// Default weighted event table.
pub fn default_event_table() -> Vec<EventTemplate> {
    vec![
        EventTemplate::new(EventKind::IndustryNews, 0.002, 0.006, 40),
        EventTemplate::new(EventKind::Partnership, 0.006, 0.012, 15),
        EventTemplate::new(EventKind::Breakthrough, 0.012, 0.020, 5),
        EventTemplate::new(EventKind::Downgrade, -0.010, -0.004, 20),
        EventTemplate::new(EventKind::Scandal, -0.020, -0.012, 8),
        EventTemplate::new(EventKind::ProductRecall, -0.035, -0.020, 3),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventGeneratorConfig {
    /// Chance per listed stock per tick
    pub stock_event_probability: f64,
    /// Chance per sector per tick
    pub sector_event_probability: f64,
    pub min_decay_ticks: u64,
    pub max_decay_ticks: u64,
    pub table: Vec<EventTemplate>,
}

impl Default for EventGeneratorConfig {
    fn default() -> Self {
        Self {
            stock_event_probability: 0.001,
            sector_event_probability: 0.002,
            min_decay_ticks: 1,
            max_decay_ticks: 20,
            table: default_event_table(),
        }
    }
}

pub struct EventGenerator {
    config: EventGeneratorConfig,
    /// `None` when the table is empty or all weights are zero
    picker: Option<WeightedIndex<u32>>,
}

impl EventGenerator {
    pub fn new(config: EventGeneratorConfig) -> Self {
        let picker = match WeightedIndex::new(config.table.iter().map(|t| t.weight)) {
            Ok(picker) => Some(picker),
            Err(e) => {
                warn!(error = %e, "event table unusable, event generation disabled");
                None
            }
        };
        Self { config, picker }
    }

    pub fn config(&self) -> &EventGeneratorConfig {
        &self.config
    }

    /// Roll for sector- and stock-scoped events at `tick`.
    ///
    /// Only listed stocks (and their sectors) participate. Sectors are
    /// visited in sorted order so a seeded run is reproducible.
    pub fn maybe_emit<R: Rng + ?Sized>(
        &self,
        tick: u64,
        stocks: &[Stock],
        rng: &mut R,
    ) -> Vec<MarketEvent> {
        let mut emitted = Vec::new();
        if self.picker.is_none() {
            return emitted;
        }

        let sector_p = self.config.sector_event_probability.clamp(0.0, 1.0);
        let stock_p = self.config.stock_event_probability.clamp(0.0, 1.0);

        let sectors: BTreeSet<&str> = stocks
            .iter()
            .filter(|s| s.listed)
            .map(|s| s.sector.as_str())
            .collect();
        for sector in sectors {
            if rng.gen_bool(sector_p) {
                if let Some(event) = self.sample(EventScope::Sector(sector.to_string()), tick, rng) {
                    emitted.push(event);
                }
            }
        }

        for stock in stocks.iter().filter(|s| s.listed) {
            if rng.gen_bool(stock_p) {
                if let Some(event) = self.sample(EventScope::Stock(stock.id.clone()), tick, rng) {
                    emitted.push(event);
                }
            }
        }

        for event in &emitted {
            debug!(
                tick,
                scope = ?event.scope,
                kind = ?event.kind,
                magnitude = event.magnitude,
                decay_ticks = event.decay_ticks,
                "market event emitted"
            );
        }
        emitted
    }

    /// Draw one event for `scope` from the table.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        scope: EventScope,
        tick: u64,
        rng: &mut R,
    ) -> Option<MarketEvent> {
        let picker = self.picker.as_ref()?;
        let template = &self.config.table[picker.sample(rng)];

        let (lo, hi) = ordered(template.min_magnitude, template.max_magnitude);
        let magnitude = if hi > lo { rng.gen_range(lo..=hi) } else { lo };

        let (min_decay, max_decay) = ordered(self.config.min_decay_ticks.max(1), self.config.max_decay_ticks.max(1));
        let decay = rng.gen_range(min_decay..=max_decay);

        Some(MarketEvent::new(scope, template.kind, magnitude, decay, tick))
    }
}

impl Default for EventGenerator {
    fn default() -> Self {
        Self::new(EventGeneratorConfig::default())
    }
}

fn ordered<T: PartialOrd>(a: T, b: T) -> (T, T) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
