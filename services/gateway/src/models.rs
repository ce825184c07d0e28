use crate::error::{AppError, ErrorBody};
use ledger::LiquidationResult;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use simulation::admin::parse_stock_id;
use types::cycle::{MacroRegime, VolatilityRegime};
use types::errors::ValidationError;
use types::event::EventScope;
use types::ids::{StockId, UserId};
use types::session::{MarketStatus, TradingSession};
use types::trade::Transaction;

pub fn parse_user_id(raw: &str) -> Result<UserId, AppError> {
    UserId::try_new(raw).ok_or_else(|| ValidationError::InvalidUserId(raw.to_string()).into())
}

pub fn parse_stock(raw: &str) -> Result<StockId, AppError> {
    Ok(parse_stock_id(raw)?)
}

/// Quantities arrive signed so that negative values get a domain error
/// instead of a deserialization failure.
pub fn parse_quantity(raw: i64) -> Result<u64, AppError> {
    u64::try_from(raw)
        .ok()
        .filter(|q| *q > 0)
        .ok_or_else(|| ValidationError::InvalidQuantity(raw.to_string()).into())
}

// ── Requests ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradeRequest {
    pub user_id: String,
    pub stock_id: String,
    pub quantity: i64,
}

/// Body of the all-in / sell-all trades.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionRequest {
    pub user_id: String,
    pub stock_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KlineQuery {
    #[serde(default = "default_period")]
    pub period: u64,
    pub limit: Option<usize>,
}

fn default_period() -> u64 {
    1
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegimeRequest {
    pub regime: MacroRegime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VolatilityRequest {
    pub regime: VolatilityRegime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InjectEventRequest {
    pub scope: EventScope,
    pub magnitude: f64,
    pub decay_ticks: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FundamentalValueRequest {
    pub value: Decimal,
}

/// `modifier` is actual over expected earnings.
#[derive(Debug, Clone, Deserialize)]
pub struct EarningsRequest {
    pub modifier: Decimal,
}

// ── Responses ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MarketStatusResponse {
    pub status: MarketStatus,
    pub tick: u64,
    pub session: TradingSession,
}

#[derive(Debug, Clone, Serialize)]
pub struct TotalAssetsResponse {
    pub user_id: UserId,
    pub total_assets: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiquidationItem {
    pub stock_id: StockId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiquidationResponse {
    pub sold: usize,
    pub failed: usize,
    pub results: Vec<LiquidationItem>,
}

impl From<LiquidationResult> for LiquidationResponse {
    fn from(result: LiquidationResult) -> Self {
        let results: Vec<LiquidationItem> = result
            .into_iter()
            .map(|(stock_id, outcome)| match outcome {
                Ok(tx) => LiquidationItem {
                    stock_id,
                    transaction: Some(tx),
                    error: None,
                },
                Err(err) => LiquidationItem {
                    stock_id,
                    transaction: None,
                    error: Some(ErrorBody::from(&err)),
                },
            })
            .collect();
        let sold = results.iter().filter(|r| r.transaction.is_some()).count();
        Self {
            sold,
            failed: results.len() - sold,
            results,
        }
    }
}
