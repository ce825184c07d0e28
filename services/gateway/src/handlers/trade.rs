use crate::error::AppError;
use crate::models::{
    parse_quantity, parse_stock, parse_user_id, LiquidationResponse, PositionRequest, TradeRequest,
};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use types::trade::Transaction;

pub async fn buy(
    State(state): State<AppState>,
    Json(payload): Json<TradeRequest>,
) -> Result<Json<Transaction>, AppError> {
    let user_id = parse_user_id(&payload.user_id)?;
    state.rate_limiter.check(&format!("{}:trade", user_id))?;

    let quantity = parse_quantity(payload.quantity)?;
    let stock_id = parse_stock(&payload.stock_id)?;
    Ok(Json(state.ledger.buy(&user_id, &stock_id, quantity).await?))
}

pub async fn sell(
    State(state): State<AppState>,
    Json(payload): Json<TradeRequest>,
) -> Result<Json<Transaction>, AppError> {
    let user_id = parse_user_id(&payload.user_id)?;
    state.rate_limiter.check(&format!("{}:trade", user_id))?;

    let quantity = parse_quantity(payload.quantity)?;
    let stock_id = parse_stock(&payload.stock_id)?;
    Ok(Json(state.ledger.sell(&user_id, &stock_id, quantity).await?))
}

pub async fn buy_all_in(
    State(state): State<AppState>,
    Json(payload): Json<PositionRequest>,
) -> Result<Json<Transaction>, AppError> {
    let user_id = parse_user_id(&payload.user_id)?;
    state.rate_limiter.check(&format!("{}:trade", user_id))?;

    let stock_id = parse_stock(&payload.stock_id)?;
    Ok(Json(state.ledger.buy_all_in(&user_id, &stock_id).await?))
}

pub async fn sell_all(
    State(state): State<AppState>,
    Json(payload): Json<PositionRequest>,
) -> Result<Json<Transaction>, AppError> {
    let user_id = parse_user_id(&payload.user_id)?;
    state.rate_limiter.check(&format!("{}:trade", user_id))?;

    let stock_id = parse_stock(&payload.stock_id)?;
    Ok(Json(state.ledger.sell_all(&user_id, &stock_id).await?))
}

pub async fn liquidate(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<LiquidationResponse>, AppError> {
    let user_id = parse_user_id(&user_id)?;
    state.rate_limiter.check(&format!("{}:trade", user_id))?;

    let result = state.ledger.liquidate_portfolio(&user_id).await?;
    Ok(Json(result.into()))
}
