//! Simulation configuration

use crate::event_generator::EventGeneratorConfig;
use crate::market_cycle::MarketCycleConfig;
use crate::price_model::PriceModelConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use types::session::TradingSession;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Wall-clock length of one tick
    pub tick_interval_secs: u64,
    /// Missed ticks simulated per stock on catch-up; older ones are
    /// backfilled with flat bars
    pub max_catch_up_ticks: u64,
    /// Upper bound on bars written for one stock in one catch-up. A longer
    /// gap drops the bars before it and starts a fresh series.
    pub max_backfill_ticks: u64,
}

impl ClockConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 300,
            max_catch_up_ticks: 12,
            max_backfill_ticks: 9000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed RNG seed; `None` seeds from entropy
    pub seed: Option<u64>,
    pub price: PriceModelConfig,
    pub events: EventGeneratorConfig,
    pub cycle: MarketCycleConfig,
    pub clock: ClockConfig,
    /// Hours during which the clock ticks
    pub session: TradingSession,
}
