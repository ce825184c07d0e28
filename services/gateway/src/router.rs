use crate::handlers::{admin, market, trade, users};
use crate::state::AppState;
use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let market_routes = Router::new()
        .route("/stocks", get(market::list_quotes))
        .route("/stocks/{id}/quote", get(market::get_quote))
        .route("/stocks/{id}/kline", get(market::get_kline))
        .route("/stocks/{id}/shareholders", get(market::list_shareholders))
        .route("/market/cycle", get(market::get_cycle))
        .route("/market/status", get(market::get_status))
        .route("/ranking", get(users::get_ranking));

    let user_routes = Router::new()
        .route("/users", post(users::register))
        .route("/users/{id}/holdings", get(users::get_holdings))
        .route("/users/{id}/transactions", get(users::get_transactions))
        .route("/users/{id}/assets", get(users::get_total_assets))
        .route("/users/{id}/liquidate", post(trade::liquidate));

    let trade_routes = Router::new()
        .route("/trades/buy", post(trade::buy))
        .route("/trades/sell", post(trade::sell))
        .route("/trades/buy-all", post(trade::buy_all_in))
        .route("/trades/sell-all", post(trade::sell_all));

    let admin_routes = Router::new()
        .route("/regime", put(admin::force_regime))
        .route("/volatility", put(admin::force_volatility))
        .route("/stocks", post(admin::add_stock))
        .route("/stocks/{id}", delete(admin::remove_stock).patch(admin::adjust_stock))
        .route("/stocks/{id}/purge", post(admin::purge_stock))
        .route("/stocks/{id}/fundamental", put(admin::set_fundamental_value))
        .route("/stocks/{id}/earnings", post(admin::report_earnings))
        .route("/events", get(admin::list_events).post(admin::inject_event));

    let api_routes = market_routes
        .merge(user_routes)
        .merge(trade_routes)
        .nest("/admin", admin_routes);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/v1", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
