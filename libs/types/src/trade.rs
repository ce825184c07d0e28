//! Executed trade records
//!
//! Every buy or sell clears instantly against the simulated price and
//! leaves one immutable, append-only `Transaction`.

use crate::ids::{StockId, TransactionId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    BUY,
    SELL,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::BUY => f.write_str("BUY"),
            Side::SELL => f.write_str("SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub stock_id: StockId,
    pub side: Side,
    pub quantity: u64,
    /// Stock price at execution, before slippage
    pub mid_price: Decimal,
    /// Slippage-adjusted execution price
    pub price: Decimal,
    /// Applied slippage fraction (0.001 = 0.1%)
    pub slippage: Decimal,
    pub fee: Decimal,
    /// Cash moved: debited for buys, credited for sells
    pub cash_amount: Decimal,
    pub tick: u64,
    pub timestamp: i64,
}

impl Transaction {
    /// Create a new executed transaction
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: UserId,
        stock_id: StockId,
        side: Side,
        quantity: u64,
        mid_price: Decimal,
        price: Decimal,
        slippage: Decimal,
        fee: Decimal,
        cash_amount: Decimal,
        tick: u64,
        timestamp: i64,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            user_id,
            stock_id,
            side,
            quantity,
            mid_price,
            price,
            slippage,
            fee,
            cash_amount,
            tick,
            timestamp,
        }
    }

    /// Notional value (quantity × execution price)
    pub fn notional(&self) -> Decimal {
        Decimal::from(self.quantity) * self.price
    }

    /// Signed effect on the user's cash balance
    pub fn cash_delta(&self) -> Decimal {
        match self.side {
            Side::BUY => -self.cash_amount,
            Side::SELL => self.cash_amount,
        }
    }
}
