use crate::error::AppError;
use crate::models::{parse_user_id, LimitQuery, RegisterRequest, TotalAssetsResponse};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use ledger::{PortfolioView, RankingEntry};
use types::account::User;
use types::trade::Transaction;

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user_id = parse_user_id(&payload.user_id)?;
    state.rate_limiter.check(&format!("{}:register", user_id))?;

    let user = state.ledger.register_user(&user_id).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_holdings(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PortfolioView>, AppError> {
    let user_id = parse_user_id(&user_id)?;
    Ok(Json(state.ledger.get_holdings(&user_id).await?))
}

pub async fn get_transactions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    let user_id = parse_user_id(&user_id)?;
    Ok(Json(state.ledger.transaction_history(&user_id, query.limit).await?))
}

pub async fn get_total_assets(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<TotalAssetsResponse>, AppError> {
    let user_id = parse_user_id(&user_id)?;
    let total_assets = state.ledger.total_assets(&user_id).await?;
    Ok(Json(TotalAssetsResponse { user_id, total_assets }))
}

pub async fn get_ranking(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<RankingEntry>>, AppError> {
    Ok(Json(state.ledger.asset_ranking(query.limit).await?))
}
