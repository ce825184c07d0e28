//! Listed stock state
//!
//! A `Stock` row is advanced only by the simulation clock; admin actions
//! create, patch or delist it.

use crate::errors::ValidationError;
use crate::ids::StockId;
use crate::numeric::{max_price, round_price};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stock {
    pub id: StockId,
    pub name: String,
    /// Latest clearing price, always > 0 at 2 dp
    pub current_price: Decimal,
    /// Per-tick noise half-width as a fraction of price (e.g. 0.02)
    pub base_volatility: Decimal,
    /// Intrinsic value the price is pulled back toward when it strays far
    pub fundamental_value: Decimal,
    /// Intraday momentum wave in progress, if any
    pub momentum: Option<MomentumWave>,
    pub sector: String,
    pub listed: bool,
    /// Last tick whose bar has been committed for this stock
    pub last_tick: Option<u64>,
    pub created_at: i64,
}

/// A directional push that rises and fades over `duration` ticks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MomentumWave {
    /// Signed peak strength; positive pushes up
    pub peak: f64,
    pub duration: u32,
    /// Ticks already played
    pub elapsed: u32,
}

impl MomentumWave {
    /// Current strength: `peak × sin(π × elapsed / duration)`.
    pub fn intensity(&self) -> f64 {
        if self.duration == 0 {
            return 0.0;
        }
        let progress = f64::from(self.elapsed.min(self.duration)) / f64::from(self.duration);
        self.peak * (progress * std::f64::consts::PI).sin()
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration
    }
}

impl Stock {
    /// Create a listed stock, validating price and volatility.
    pub fn new(
        id: StockId,
        name: impl Into<String>,
        price: Decimal,
        base_volatility: Decimal,
        sector: impl Into<String>,
        created_at: i64,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        let sector = sector.into();
        validate_text("name", &name)?;
        validate_text("sector", &sector)?;
        let price = validate_price(price)?;
        Ok(Self {
            id,
            name,
            current_price: price,
            base_volatility: validate_volatility(base_volatility)?,
            fundamental_value: price,
            momentum: None,
            sector,
            listed: true,
            last_tick: None,
            created_at,
        })
    }

    /// Apply an admin patch; the stock is left untouched on error.
    pub fn apply_patch(&mut self, patch: &StockPatch) -> Result<(), ValidationError> {
        let mut next = self.clone();
        if let Some(name) = &patch.name {
            validate_text("name", name)?;
            next.name = name.clone();
        }
        if let Some(sector) = &patch.sector {
            validate_text("sector", sector)?;
            next.sector = sector.clone();
        }
        if let Some(price) = patch.current_price {
            next.current_price = validate_price(price)?;
        }
        if let Some(vol) = patch.base_volatility {
            next.base_volatility = validate_volatility(vol)?;
        }
        if let Some(value) = patch.fundamental_value {
            next.fundamental_value = validate_price(value)?;
        }
        if let Some(listed) = patch.listed {
            next.listed = listed;
        }
        *self = next;
        Ok(())
    }
}

/// Partial update for [`Stock`]; `None` fields are left as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockPatch {
    pub name: Option<String>,
    pub sector: Option<String>,
    pub current_price: Option<Decimal>,
    pub base_volatility: Option<Decimal>,
    pub fundamental_value: Option<Decimal>,
    pub listed: Option<bool>,
}

impl StockPatch {
    pub fn is_empty(&self) -> bool {
        self == &StockPatch::default()
    }
}

/// Round a price to 2 dp and check it lies in `(0, max_price]`.
pub fn validate_price(price: Decimal) -> Result<Decimal, ValidationError> {
    let rounded = round_price(price);
    if rounded <= Decimal::ZERO || rounded > max_price() {
        return Err(ValidationError::InvalidPrice(price.to_string()));
    }
    Ok(rounded)
}

fn validate_volatility(vol: Decimal) -> Result<Decimal, ValidationError> {
    if vol < Decimal::ZERO || vol >= Decimal::ONE {
        return Err(ValidationError::InvalidVolatility(vol.to_string()));
    }
    Ok(vol)
}

fn validate_text(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::InvalidField(format!("{field} must not be blank")));
    }
    Ok(())
}
