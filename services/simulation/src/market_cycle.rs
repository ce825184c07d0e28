//! Market cycle state machine
//!
//! Macro regime (bull / bear / sideways) and volatility regime (high / low)
//! evolve independently. Each tick decrements both counters; a counter that
//! reaches zero triggers a transition and a fresh duration draw.
//!
//! Macro transitions follow a weighted table in which sideways is the
//! likely successor of everything and bull ↔ bear snaps are rare.

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;
use types::cycle::{MacroRegime, MarketCycleState, VolatilityRegime};

/// Successor weights for one macro regime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionWeights {
    pub bull: f64,
    pub bear: f64,
    pub sideways: f64,
}

impl TransitionWeights {
    pub fn new(bull: f64, bear: f64, sideways: f64) -> Self {
        Self {
            bull,
            bear,
            sideways,
        }
    }
}

/// Inclusive tick range a regime lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationRange {
    pub min: u64,
    pub max: u64,
}

impl DurationRange {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        let lo = self.min.min(self.max).max(1);
        let hi = self.max.max(lo);
        rng.gen_range(lo..=hi)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketCycleConfig {
    pub from_bull: TransitionWeights,
    pub from_bear: TransitionWeights,
    pub from_sideways: TransitionWeights,
    pub bull_duration: DurationRange,
    pub bear_duration: DurationRange,
    pub sideways_duration: DurationRange,
    pub volatility_duration: DurationRange,
}

impl Default for MarketCycleConfig {
    fn default() -> Self {
        Self {
            from_bull: TransitionWeights::new(0.25, 0.05, 0.70),
            from_bear: TransitionWeights::new(0.05, 0.25, 0.70),
            from_sideways: TransitionWeights::new(0.30, 0.30, 0.40),
            bull_duration: DurationRange::new(40, 120),
            bear_duration: DurationRange::new(40, 120),
            sideways_duration: DurationRange::new(20, 60),
            volatility_duration: DurationRange::new(10, 40),
        }
    }
}

/// Regime changes produced by one `advance`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleTransition {
    pub macro_change: Option<(MacroRegime, MacroRegime)>,
    pub volatility_change: Option<(VolatilityRegime, VolatilityRegime)>,
}

pub struct MarketCycle {
    config: MarketCycleConfig,
}

impl MarketCycle {
    pub fn new(config: MarketCycleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MarketCycleConfig {
        &self.config
    }

    /// Fresh state for an empty market: sideways, low volatility.
    pub fn initial_state<R: Rng + ?Sized>(&self, rng: &mut R) -> MarketCycleState {
        MarketCycleState::new(
            MacroRegime::Sideways,
            VolatilityRegime::Low,
            self.config.sideways_duration.sample(rng),
            self.config.volatility_duration.sample(rng),
        )
    }

    /// Advance one tick: bump `tick_index`, count down, transition at zero.
    pub fn advance<R: Rng + ?Sized>(
        &self,
        state: &mut MarketCycleState,
        rng: &mut R,
    ) -> CycleTransition {
        let mut transition = CycleTransition::default();
        state.tick_index += 1;

        state.ticks_remaining_in_regime = state.ticks_remaining_in_regime.saturating_sub(1);
        if state.ticks_remaining_in_regime == 0 {
            let from = state.macro_regime;
            let to = self.next_regime(from, rng);
            state.macro_regime = to;
            state.ticks_remaining_in_regime = self.duration_for(to).sample(rng);
            if from != to {
                transition.macro_change = Some((from, to));
                info!(tick = state.tick_index, from = %from, to = %to, remaining = state.ticks_remaining_in_regime, "macro regime changed");
            }
        }

        state.ticks_remaining_in_volatility = state.ticks_remaining_in_volatility.saturating_sub(1);
        if state.ticks_remaining_in_volatility == 0 {
            let from = state.volatility_regime;
            let to = from.toggled();
            state.volatility_regime = to;
            state.ticks_remaining_in_volatility = self.config.volatility_duration.sample(rng);
            transition.volatility_change = Some((from, to));
            info!(tick = state.tick_index, from = %from, to = %to, "volatility regime changed");
        }

        transition
    }

    /// Draw the successor of `from` from the transition table.
    pub fn next_regime<R: Rng + ?Sized>(&self, from: MacroRegime, rng: &mut R) -> MacroRegime {
        let weights = self.weights_from(from);
        let options = [
            (MacroRegime::Bull, weights.bull),
            (MacroRegime::Bear, weights.bear),
            (MacroRegime::Sideways, weights.sideways),
        ];
        match WeightedIndex::new(options.iter().map(|(_, w)| w.max(0.0))) {
            Ok(picker) => options[picker.sample(rng)].0,
            Err(_) => MacroRegime::Sideways,
        }
    }

    /// Replace the macro regime immediately, bypassing the table.
    pub fn force_regime<R: Rng + ?Sized>(
        &self,
        state: &mut MarketCycleState,
        regime: MacroRegime,
        rng: &mut R,
    ) {
        state.macro_regime = regime;
        state.ticks_remaining_in_regime = self.duration_for(regime).sample(rng);
    }

    /// Replace the volatility regime immediately.
    pub fn force_volatility<R: Rng + ?Sized>(
        &self,
        state: &mut MarketCycleState,
        regime: VolatilityRegime,
        rng: &mut R,
    ) {
        state.volatility_regime = regime;
        state.ticks_remaining_in_volatility = self.config.volatility_duration.sample(rng);
    }

    pub fn duration_for(&self, regime: MacroRegime) -> DurationRange {
        match regime {
            MacroRegime::Bull => self.config.bull_duration,
            MacroRegime::Bear => self.config.bear_duration,
            MacroRegime::Sideways => self.config.sideways_duration,
        }
    }

    fn weights_from(&self, regime: MacroRegime) -> TransitionWeights {
        match regime {
            MacroRegime::Bull => self.config.from_bull,
            MacroRegime::Bear => self.config.from_bear,
            MacroRegime::Sideways => self.config.from_sideways,
        }
    }
}

impl Default for MarketCycle {
    fn default() -> Self {
        Self::new(MarketCycleConfig::default())
    }
}
