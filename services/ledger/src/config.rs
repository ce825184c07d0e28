//! Ledger configuration

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::session::TradingSession;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Fee as a fraction of notional (0.01 = 1%)
    pub fee_rate: Decimal,
    /// Notional at which slippage reaches 100%; zero disables slippage
    pub liquidity_depth: Decimal,
    /// Slippage ceiling as a fraction of the mid price
    pub max_slippage: Decimal,
    /// Ticks a bought lot stays unsellable
    pub lock_duration_ticks: u64,
    /// Cash granted on registration
    pub initial_cash: Decimal,
    /// Bars covered by a quote's open/high/low (288 = 24h at 5 min)
    pub quote_window_ticks: usize,
    pub sma_period: usize,
    pub default_kline_limit: usize,
    pub max_kline_limit: usize,
    pub history_limit: usize,
    pub ranking_limit: usize,
    /// Trades are refused outside these hours
    pub session: TradingSession,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fee_rate: Decimal::from_str_exact("0.01").unwrap(),
            liquidity_depth: Decimal::from(2_000_000),
            max_slippage: Decimal::from_str_exact("0.3").unwrap(),
            lock_duration_ticks: 12,
            initial_cash: Decimal::from_str_exact("10000.00").unwrap(),
            quote_window_ticks: 288,
            sma_period: 5,
            default_kline_limit: 100,
            max_kline_limit: 1000,
            history_limit: 50,
            ranking_limit: 10,
            session: TradingSession::default(),
        }
    }
}
