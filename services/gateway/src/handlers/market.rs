use crate::error::AppError;
use crate::models::{parse_stock, KlineQuery, MarketStatusResponse};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use ledger::{Quote, ShareholderView};
use types::cycle::MarketCycleState;
use types::kline::KlineBar;

pub async fn list_quotes(State(state): State<AppState>) -> Result<Json<Vec<Quote>>, AppError> {
    Ok(Json(state.ledger.list_quotes().await?))
}

pub async fn get_quote(
    State(state): State<AppState>,
    Path(stock_id): Path<String>,
) -> Result<Json<Quote>, AppError> {
    let stock_id = parse_stock(&stock_id)?;
    Ok(Json(state.ledger.get_quote(&stock_id).await?))
}

pub async fn get_kline(
    State(state): State<AppState>,
    Path(stock_id): Path<String>,
    Query(query): Query<KlineQuery>,
) -> Result<Json<Vec<KlineBar>>, AppError> {
    let stock_id = parse_stock(&stock_id)?;
    let bars = state.ledger.get_kline(&stock_id, query.period, query.limit).await?;
    Ok(Json(bars))
}

pub async fn list_shareholders(
    State(state): State<AppState>,
    Path(stock_id): Path<String>,
) -> Result<Json<Vec<ShareholderView>>, AppError> {
    let stock_id = parse_stock(&stock_id)?;
    Ok(Json(state.ledger.list_shareholders(&stock_id).await?))
}

/// Whether the market is trading right now, and its hours.
pub async fn get_status(State(state): State<AppState>) -> Result<Json<MarketStatusResponse>, AppError> {
    let session = state.clock.session().clone();
    let cycle = state.clock.current_cycle().await?;
    Ok(Json(MarketStatusResponse {
        status: session.status_now(),
        tick: cycle.tick_index,
        session,
    }))
}

pub async fn get_cycle(State(state): State<AppState>) -> Result<Json<MarketCycleState>, AppError> {
    Ok(Json(state.clock.current_cycle().await?))
}
