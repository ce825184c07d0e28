//! Operator endpoints. Every handler requires [`AdminAuth`].

use crate::auth::AdminAuth;
use crate::error::AppError;
use crate::models::{
    parse_stock, EarningsRequest, FundamentalValueRequest, InjectEventRequest, RegimeRequest, VolatilityRequest,
};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use simulation::NewStock;
use tracing::info;
use types::cycle::MarketCycleState;
use types::event::MarketEvent;
use types::stock::{Stock, StockPatch};

pub async fn force_regime(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Json(payload): Json<RegimeRequest>,
) -> Result<Json<MarketCycleState>, AppError> {
    info!(regime = %payload.regime, "admin forcing macro regime");
    Ok(Json(state.admin.force_regime(payload.regime).await?))
}

pub async fn force_volatility(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Json(payload): Json<VolatilityRequest>,
) -> Result<Json<MarketCycleState>, AppError> {
    info!(regime = %payload.regime, "admin forcing volatility regime");
    Ok(Json(state.admin.force_volatility(payload.regime).await?))
}

pub async fn add_stock(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Json(payload): Json<NewStock>,
) -> Result<(StatusCode, Json<Stock>), AppError> {
    let stock = state.admin.add_stock(payload).await?;
    Ok((StatusCode::CREATED, Json(stock)))
}

/// Delist: the stock stops ticking and trading, history stays readable.
pub async fn remove_stock(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Path(stock_id): Path<String>,
) -> Result<Json<Stock>, AppError> {
    let stock_id = parse_stock(&stock_id)?;
    Ok(Json(state.admin.remove_stock(&stock_id).await?))
}

pub async fn purge_stock(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Path(stock_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let stock_id = parse_stock(&stock_id)?;
    state.admin.purge_stock(&stock_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn adjust_stock(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Path(stock_id): Path<String>,
    Json(patch): Json<StockPatch>,
) -> Result<Json<Stock>, AppError> {
    let stock_id = parse_stock(&stock_id)?;
    Ok(Json(state.admin.adjust_stock(&stock_id, patch).await?))
}

pub async fn set_fundamental_value(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Path(stock_id): Path<String>,
    Json(payload): Json<FundamentalValueRequest>,
) -> Result<Json<Stock>, AppError> {
    let stock_id = parse_stock(&stock_id)?;
    Ok(Json(state.admin.set_fundamental_value(&stock_id, payload.value).await?))
}

pub async fn report_earnings(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Path(stock_id): Path<String>,
    Json(payload): Json<EarningsRequest>,
) -> Result<Json<Stock>, AppError> {
    let stock_id = parse_stock(&stock_id)?;
    Ok(Json(state.admin.report_earnings(&stock_id, payload.modifier).await?))
}

pub async fn inject_event(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Json(payload): Json<InjectEventRequest>,
) -> Result<(StatusCode, Json<MarketEvent>), AppError> {
    let event = state
        .admin
        .inject_event(payload.scope, payload.magnitude, payload.decay_ticks)
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn list_events(_admin: AdminAuth, State(state): State<AppState>) -> Json<Vec<MarketEvent>> {
    Json(state.admin.list_events())
}
