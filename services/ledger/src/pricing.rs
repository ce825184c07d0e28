//! Trade pricing
//!
//! Clearing price = mid price moved against the trader by slippage:
//!
//! ```text
//! slippage  = min(qty × mid / liquidity_depth, max_slippage)
//! buy price = ceil_cent(mid × (1 + slippage))
//! sell price = floor_cent(mid × (1 - slippage))
//! fee       = ceil_cent(qty × price × fee_rate)
//! ```
//!
//! A buy debits `notional + fee`; a sell credits `notional - fee`.
//! Every amount is exact at 2 dp, so repeated trades never drift.

use crate::config::LedgerConfig;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::errors::ValidationError;
use types::numeric::{min_price, round_charge, round_credit};
use types::trade::Side;

/// Fully priced trade, before any state is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeQuote {
    pub side: Side,
    pub quantity: u64,
    pub mid_price: Decimal,
    pub slippage: Decimal,
    pub effective_price: Decimal,
    pub notional: Decimal,
    pub fee: Decimal,
    /// Debit for buys, credit for sells
    pub cash_amount: Decimal,
}

/// Slippage fraction for `quantity` shares at `mid`.
pub fn slippage_fraction(
    config: &LedgerConfig,
    mid: Decimal,
    quantity: u64,
) -> Result<Decimal, ValidationError> {
    if config.liquidity_depth <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    let notional = value_of(mid, quantity)?;
    let cap = config.max_slippage.max(Decimal::ZERO);
    let fraction = notional
        .checked_div(config.liquidity_depth)
        .ok_or_else(|| order_too_large(quantity))?;
    Ok(fraction.min(cap))
}

pub fn fee(config: &LedgerConfig, notional: Decimal) -> Result<Decimal, ValidationError> {
    notional
        .checked_mul(config.fee_rate.max(Decimal::ZERO))
        .map(round_charge)
        .ok_or_else(|| ValidationError::InvalidQuantity(format!("fee on {notional} overflows")))
}

pub fn quote_buy(config: &LedgerConfig, mid: Decimal, quantity: u64) -> Result<TradeQuote, ValidationError> {
    let slippage = slippage_fraction(config, mid, quantity)?;
    let effective_price = round_charge(
        mid.checked_mul(Decimal::ONE + slippage)
            .ok_or_else(|| order_too_large(quantity))?,
    );
    let notional = value_of(effective_price, quantity)?;
    let fee = fee(config, notional)?;
    let cash_amount = notional
        .checked_add(fee)
        .ok_or_else(|| order_too_large(quantity))?;
    Ok(TradeQuote {
        side: Side::BUY,
        quantity,
        mid_price: mid,
        slippage,
        effective_price,
        notional,
        fee,
        cash_amount,
    })
}

pub fn quote_sell(config: &LedgerConfig, mid: Decimal, quantity: u64) -> Result<TradeQuote, ValidationError> {
    let slippage = slippage_fraction(config, mid, quantity)?;
    let effective_price = round_credit(mid * (Decimal::ONE - slippage)).max(min_price());
    let notional = value_of(effective_price, quantity)?;
    let fee = fee(config, notional)?;
    Ok(TradeQuote {
        side: Side::SELL,
        quantity,
        mid_price: mid,
        slippage,
        effective_price,
        notional,
        fee,
        cash_amount: (notional - fee).max(Decimal::ZERO),
    })
}

/// Largest quantity whose buy cost fits in `cash`.
///
/// Cost is monotonic in quantity, so a binary search over
/// `[0, cash / mid]` finds it.
pub fn max_affordable(config: &LedgerConfig, mid: Decimal, cash: Decimal) -> u64 {
    if mid <= Decimal::ZERO || cash <= Decimal::ZERO {
        return 0;
    }
    let mut hi = (cash / mid).floor().to_u64().unwrap_or(0);
    let mut lo = 0u64;
    while lo < hi {
        let mid_qty = lo + (hi - lo + 1) / 2;
        let fits = matches!(quote_buy(config, mid, mid_qty), Ok(q) if q.cash_amount <= cash);
        if fits {
            lo = mid_qty;
        } else {
            hi = mid_qty - 1;
        }
    }
    lo
}

/// `price × quantity`, rejecting orders too large to represent.
fn value_of(price: Decimal, quantity: u64) -> Result<Decimal, ValidationError> {
    price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(|| order_too_large(quantity))
}

fn order_too_large(quantity: u64) -> ValidationError {
    ValidationError::InvalidQuantity(format!("order of {quantity} shares is too large"))
}
