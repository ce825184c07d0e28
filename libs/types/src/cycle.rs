//! Market cycle state
//!
//! Macro regime × volatility regime, six composite states. Exactly one
//! live instance exists, persisted through the repository.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Macro-economic regime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacroRegime {
    Bull,
    Bear,
    Sideways,
}

impl MacroRegime {
    pub fn all() -> &'static [MacroRegime] {
        &[MacroRegime::Bull, MacroRegime::Bear, MacroRegime::Sideways]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MacroRegime::Bull => "bull",
            MacroRegime::Bear => "bear",
            MacroRegime::Sideways => "sideways",
        }
    }
}

impl fmt::Display for MacroRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MacroRegime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bull" => Ok(MacroRegime::Bull),
            "bear" => Ok(MacroRegime::Bear),
            "sideways" | "neutral" => Ok(MacroRegime::Sideways),
            other => Err(format!("unknown macro regime: {other}")),
        }
    }
}

/// Volatility regime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityRegime {
    High,
    Low,
}

impl VolatilityRegime {
    pub fn toggled(&self) -> Self {
        match self {
            VolatilityRegime::High => VolatilityRegime::Low,
            VolatilityRegime::Low => VolatilityRegime::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VolatilityRegime::High => "high",
            VolatilityRegime::Low => "low",
        }
    }
}

impl fmt::Display for VolatilityRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VolatilityRegime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "high-vol" => Ok(VolatilityRegime::High),
            "low" | "low-vol" => Ok(VolatilityRegime::Low),
            other => Err(format!("unknown volatility regime: {other}")),
        }
    }
}

/// Persisted cycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketCycleState {
    pub macro_regime: MacroRegime,
    pub volatility_regime: VolatilityRegime,
    pub ticks_remaining_in_regime: u64,
    pub ticks_remaining_in_volatility: u64,
    /// Index of the last completed tick; 0 before the first tick
    pub tick_index: u64,
}

impl MarketCycleState {
    pub fn new(
        macro_regime: MacroRegime,
        volatility_regime: VolatilityRegime,
        ticks_remaining_in_regime: u64,
        ticks_remaining_in_volatility: u64,
    ) -> Self {
        Self {
            macro_regime,
            volatility_regime,
            ticks_remaining_in_regime,
            ticks_remaining_in_volatility,
            tick_index: 0,
        }
    }
}

impl Default for MarketCycleState {
    fn default() -> Self {
        Self::new(MacroRegime::Sideways, VolatilityRegime::Low, 30, 20)
    }
}
