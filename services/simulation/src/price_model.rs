//! Price model
//!
//! Turns a stock's current state plus the market regime into its next
//! tick price. Pure: all randomness comes from the caller's `Rng`, so a
//! seeded generator reproduces a run exactly.
//!
//! Per-tick return:
//!
//! ```text
//! r = drift(macro) + U(-w, w) + Σ event.current_magnitude(tick)
//!   + wave.intensity() × w × wave_strength
//!   + reversion(price / fundamental_value)
//! w = base_volatility × noise_scale × (high_vol_multiplier if high-vol else 1)
//! ```
//!
//! Reversion is zero while the price stays between `fundamental_low_ratio`
//! and `fundamental_high_ratio` times the fundamental value, and grows with
//! the log distance outside that zone.
//!
//! `r` is capped at ±`max_move_pct`, and the resulting price is clamped so
//! that it never leaves `[prev × (1 - cap), prev × (1 + cap)]` after rounding
//! and never drops below 0.01. A [`PriceBand`] built from recent closes
//! narrows that range further, but never pushes a price that already sits
//! outside the band by more than the per-tick cap.

use rand::Rng;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::cycle::{MacroRegime, VolatilityRegime};
use types::event::MarketEvent;
use types::numeric::{max_price, min_price, round_charge, round_credit, round_price, MONEY_DP};
use types::stock::{MomentumWave, Stock};

/// Peak and length range of one class of momentum wave.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WaveShape {
    pub peak_min: f64,
    pub peak_max: f64,
    pub ticks_min: u32,
    pub ticks_max: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceModelConfig {
    pub bull_drift: f64,
    pub bear_drift: f64,
    pub sideways_drift: f64,
    /// Scales every stock's base volatility
    pub noise_scale: f64,
    /// Noise width multiplier in the high-volatility regime
    pub high_vol_multiplier: f64,
    /// Per-tick move cap as a fraction of the previous price
    pub max_move_pct: Decimal,
    /// Max wick extension beyond the body, as a fraction of the noise width
    pub wick_factor: f64,

    /// Pull per tick, per unit of log distance outside the fair zone
    pub fundamental_reversion: f64,
    pub fundamental_low_ratio: f64,
    pub fundamental_high_ratio: f64,
    /// Per-tick half-width of the fundamental value's own random walk
    pub fundamental_noise: f64,
    /// How much of an earnings surprise reaches the fundamental value
    pub earnings_sensitivity: Decimal,

    /// Chance per tick that an idle stock starts a momentum wave
    pub wave_start_probability: f64,
    /// Share of new waves that are big
    pub big_wave_probability: f64,
    pub small_wave: WaveShape,
    pub big_wave: WaveShape,
    /// Wave contribution per unit of intensity, as a fraction of the noise width
    pub wave_strength: f64,

    /// Closes looked back for the short price band
    pub window_limit_ticks: usize,
    /// Max move against the close `window_limit_ticks` ago
    pub window_limit_pct: Decimal,
    /// Closes looked back for the daily price band
    pub daily_limit_ticks: usize,
    /// Max move against the close `daily_limit_ticks` ago
    pub daily_limit_pct: Decimal,
}

impl Default for PriceModelConfig {
    fn default() -> Self {
        Self {
            bull_drift: 0.0015,
            bear_drift: -0.0015,
            sideways_drift: 0.0,
            noise_scale: 1.0,
            high_vol_multiplier: 2.5,
            max_move_pct: Decimal::from_str_exact("0.10").unwrap(),
            wick_factor: 0.5,
            fundamental_reversion: 0.01,
            fundamental_low_ratio: 0.7,
            fundamental_high_ratio: 1.5,
            fundamental_noise: 0.0001,
            earnings_sensitivity: Decimal::from_str_exact("0.5").unwrap(),
            wave_start_probability: 0.3,
            big_wave_probability: 0.03,
            small_wave: WaveShape {
                peak_min: 0.4,
                peak_max: 0.8,
                ticks_min: 5,
                ticks_max: 12,
            },
            big_wave: WaveShape {
                peak_min: 1.0,
                peak_max: 1.6,
                ticks_min: 12,
                ticks_max: 24,
            },
            wave_strength: 0.5,
            window_limit_ticks: 12,
            window_limit_pct: Decimal::from_str_exact("0.50").unwrap(),
            daily_limit_ticks: 288,
            daily_limit_pct: Decimal::ONE,
        }
    }
}

/// Regime and events a single price step is computed against.
#[derive(Debug, Clone, Copy)]
pub struct MarketConditions<'a> {
    pub macro_regime: MacroRegime,
    pub volatility_regime: VolatilityRegime,
    pub events: &'a [MarketEvent],
    pub tick: u64,
}

/// Reference closes a new price is limited against.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PriceBand {
    /// Close `window_limit_ticks` ago, or the oldest known close
    pub window_ref: Option<Decimal>,
    /// Close `daily_limit_ticks` ago, or the oldest known close
    pub daily_ref: Option<Decimal>,
}

/// One tick of price movement as an OHLC bar body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceStep {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Return before clamping
    pub raw_return: f64,
    /// Fundamental value after this tick's drift
    pub fundamental_value: Decimal,
    /// Wave state after this tick
    pub momentum: Option<MomentumWave>,
}

impl PriceStep {
    /// Carry the step's price and per-stock state into `stock`.
    pub fn apply_to(&self, stock: &mut Stock) {
        stock.current_price = self.close;
        stock.fundamental_value = self.fundamental_value;
        stock.momentum = self.momentum;
    }
}

pub struct PriceModel {
    config: PriceModelConfig,
}

impl PriceModel {
    pub fn new(config: PriceModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PriceModelConfig {
        &self.config
    }

    pub fn drift(&self, regime: MacroRegime) -> f64 {
        match regime {
            MacroRegime::Bull => self.config.bull_drift,
            MacroRegime::Bear => self.config.bear_drift,
            MacroRegime::Sideways => self.config.sideways_drift,
        }
    }

    /// Half-width of the uniform noise band for `stock`.
    pub fn noise_width(&self, stock: &Stock, regime: VolatilityRegime) -> f64 {
        let base = stock.base_volatility.to_f64().unwrap_or(0.0) * self.config.noise_scale;
        let multiplier = match regime {
            VolatilityRegime::High => self.config.high_vol_multiplier,
            VolatilityRegime::Low => 1.0,
        };
        (base * multiplier).max(0.0)
    }

    /// Sum of live event biases that apply to `stock` at `tick`.
    pub fn event_bias(stock: &Stock, events: &[MarketEvent], tick: u64) -> f64 {
        events
            .iter()
            .filter(|e| e.applies_to(stock))
            .map(|e| e.current_magnitude(tick))
            .sum()
    }

    /// Return pulling `price` back toward the fair zone around `value`.
    pub fn reversion(&self, price: Decimal, value: Decimal) -> f64 {
        let (Some(p), Some(v)) = (price.to_f64(), value.to_f64()) else {
            return 0.0;
        };
        if p <= 0.0 || v <= 0.0 {
            return 0.0;
        }
        let ratio = p / v;
        let k = self.config.fundamental_reversion.max(0.0);
        if ratio < self.config.fundamental_low_ratio {
            k * (self.config.fundamental_low_ratio / ratio).ln()
        } else if ratio > self.config.fundamental_high_ratio {
            -k * (ratio / self.config.fundamental_high_ratio).ln()
        } else {
            0.0
        }
    }

    /// Fundamental value after an earnings report. A `modifier` of 1.0 is
    /// in line with expectations; 1.2 is a 20% beat.
    pub fn earnings_value(&self, value: Decimal, modifier: Decimal) -> Decimal {
        let surprise = (modifier - Decimal::ONE) * self.config.earnings_sensitivity;
        round_price(value * (Decimal::ONE + surprise))
            .clamp(min_price(), max_price())
    }

    /// Band of reference closes from a stock's close history, oldest first.
    pub fn band_from_closes(&self, closes: &[Decimal]) -> PriceBand {
        let reference = |ticks: usize| {
            if ticks == 0 || closes.is_empty() {
                return None;
            }
            closes.get(closes.len().saturating_sub(ticks)).copied()
        };
        PriceBand {
            window_ref: reference(self.config.window_limit_ticks),
            daily_ref: reference(self.config.daily_limit_ticks),
        }
    }

    /// Next close price for `stock`.
    pub fn next_price<R: Rng + ?Sized>(
        &self,
        stock: &Stock,
        conditions: &MarketConditions<'_>,
        band: &PriceBand,
        rng: &mut R,
    ) -> Decimal {
        self.next_step(stock, conditions, band, rng).close
    }

    /// Next OHLC step for `stock`. Open is the current price.
    pub fn next_step<R: Rng + ?Sized>(
        &self,
        stock: &Stock,
        conditions: &MarketConditions<'_>,
        band: &PriceBand,
        rng: &mut R,
    ) -> PriceStep {
        let width = self.noise_width(stock, conditions.volatility_regime);
        let momentum = self.advance_wave(stock.momentum, conditions.macro_regime, rng);
        let wave = momentum.map(|w| w.intensity()).unwrap_or(0.0) * width * self.config.wave_strength;
        let noise = if width > 0.0 {
            rng.gen_range(-width..=width)
        } else {
            0.0
        };
        let open = stock.current_price;
        let raw_return = self.drift(conditions.macro_regime)
            + noise
            + Self::event_bias(stock, conditions.events, conditions.tick)
            + wave
            + self.reversion(open, stock.fundamental_value);

        let close = self.apply_return(open, raw_return, band);

        let body_high = open.max(close);
        let body_low = open.min(close);
        let wick = width * self.config.wick_factor;
        let (up, down) = if wick > 0.0 {
            (rng.gen_range(0.0..=wick), rng.gen_range(0.0..=wick))
        } else {
            (0.0, 0.0)
        };
        let high = round_price(body_high * (Decimal::ONE + to_decimal(up))).max(body_high);
        let low = round_price(body_low * (Decimal::ONE - to_decimal(down)))
            .max(min_price())
            .min(body_low);

        PriceStep {
            open,
            high,
            low,
            close,
            raw_return,
            fundamental_value: self.drift_fundamental(stock.fundamental_value, rng),
            momentum,
        }
    }

    /// Play one tick of the current wave, or maybe start a new one.
    fn advance_wave<R: Rng + ?Sized>(
        &self,
        current: Option<MomentumWave>,
        regime: MacroRegime,
        rng: &mut R,
    ) -> Option<MomentumWave> {
        let mut wave = current.filter(|w| !w.is_finished());
        let start = self.config.wave_start_probability.clamp(0.0, 1.0);
        if wave.is_none() && start > 0.0 && rng.gen_bool(start) {
            let up = match regime {
                MacroRegime::Bull => 0.6,
                MacroRegime::Bear => 0.4,
                MacroRegime::Sideways => 0.5,
            };
            let direction = if rng.gen_bool(up) { 1.0 } else { -1.0 };
            let shape = if rng.gen_bool(self.config.big_wave_probability.clamp(0.0, 1.0)) {
                self.config.big_wave
            } else {
                self.config.small_wave
            };
            let peak = if shape.peak_max > shape.peak_min {
                rng.gen_range(shape.peak_min..=shape.peak_max)
            } else {
                shape.peak_min
            };
            let (lo, hi) = (shape.ticks_min.min(shape.ticks_max), shape.ticks_min.max(shape.ticks_max));
            wave = Some(MomentumWave {
                peak: direction * peak,
                duration: rng.gen_range(lo..=hi).max(1),
                elapsed: 0,
            });
        }
        if let Some(w) = wave.as_mut() {
            w.elapsed += 1;
        }
        wave
    }

    fn drift_fundamental<R: Rng + ?Sized>(&self, value: Decimal, rng: &mut R) -> Decimal {
        let n = self.config.fundamental_noise;
        if n <= 0.0 {
            return value;
        }
        let step = to_decimal(rng.gen_range(-n..=n));
        round_price(value * (Decimal::ONE + step)).clamp(min_price(), max_price())
    }

    /// Apply a return to `prev`, honoring the move cap, the price band and
    /// the price floor.
    pub fn apply_return(&self, prev: Decimal, raw_return: f64, band: &PriceBand) -> Decimal {
        let cap = self.config.max_move_pct.max(Decimal::ZERO);
        let r = to_decimal(raw_return).clamp(-cap, cap);
        let candidate = self.clamp_price(prev, prev * (Decimal::ONE + r));

        match self.band_limits(band) {
            Some((lower, upper)) => candidate
                .clamp(lower.min(prev), upper.max(prev))
                .max(min_price()),
            None => candidate,
        }
    }

    /// Intersection of the window and daily bands, rounded inward.
    fn band_limits(&self, band: &PriceBand) -> Option<(Decimal, Decimal)> {
        let limits = [
            (band.window_ref, self.config.window_limit_pct),
            (band.daily_ref, self.config.daily_limit_pct),
        ];
        let mut range: Option<(Decimal, Decimal)> = None;
        for (reference, pct) in limits {
            let Some(reference) = reference.filter(|r| *r > Decimal::ZERO) else {
                continue;
            };
            let pct = pct.max(Decimal::ZERO);
            let lower = round_charge(reference * (Decimal::ONE - pct).max(Decimal::ZERO));
            let upper = round_credit(reference * (Decimal::ONE + pct));
            range = Some(match range {
                Some((lo, hi)) => (lo.max(lower), hi.min(upper)),
                None => (lower, upper),
            });
        }
        range.filter(|(lo, hi)| lo <= hi)
    }

    /// Clamp a candidate price into the allowed band around `prev`.
    ///
    /// Bounds are rounded inward so the cap holds exactly at 2 dp.
    pub fn clamp_price(&self, prev: Decimal, candidate: Decimal) -> Decimal {
        let cap = self.config.max_move_pct.max(Decimal::ZERO);
        let upper = round_credit(prev * (Decimal::ONE + cap));
        let lower = round_charge(prev * (Decimal::ONE - cap));
        round_price(candidate)
            .clamp(lower.min(upper), upper)
            .clamp(min_price(), max_price())
    }
}

impl Default for PriceModel {
    fn default() -> Self {
        Self::new(PriceModelConfig::default())
    }
}

fn to_decimal(value: f64) -> Decimal {
    if !value.is_finite() {
        return Decimal::ZERO;
    }
    Decimal::from_f64(value)
        .map(|d| d.round_dp(8))
        .unwrap_or(Decimal::ZERO)
}

/// Largest relative move between two 2 dp prices, as a Decimal.
pub fn relative_move(prev: Decimal, next: Decimal) -> Decimal {
    if prev.is_zero() {
        return Decimal::ZERO;
    }
    ((next - prev) / prev).abs().round_dp(MONEY_DP + 8)
}
