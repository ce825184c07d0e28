//! Decimal precision rules for prices and cash
//!
//! Uses rust_decimal for deterministic arithmetic. Prices and cash are
//! carried at 2 dp. Charges to a trader round against the trader, credits
//! round down, so the house never undercharges.

use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places for prices and cash balances.
pub const MONEY_DP: u32 = 2;

/// Decimal places for average cost.
pub const AVG_COST_DP: u32 = 4;

/// Smallest representable positive price (0.01).
pub fn min_price() -> Decimal {
    Decimal::new(1, MONEY_DP)
}

/// Largest price a stock may carry. Keeps `price × quantity` inside
/// `Decimal` range for any `u64` quantity.
pub fn max_price() -> Decimal {
    Decimal::from(1_000_000_000u64)
}

/// Round a price to 2 dp, half away from zero.
pub fn round_price(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a charge up to the next cent.
pub fn round_charge(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::AwayFromZero)
}

/// Round a credit down to the cent.
pub fn round_credit(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::ToZero)
}

/// Round an average cost to 4 dp.
pub fn round_avg_cost(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AVG_COST_DP, RoundingStrategy::MidpointAwayFromZero)
}
