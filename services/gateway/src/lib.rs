//! HTTP gateway for the virtual stock market
//!
//! Maps the trading and admin surfaces 1:1 onto JSON routes under `/v1`
//! and owns the process-level loops (simulation clock, snapshots).
//!
//! # Modules
//! - `config`: TOML configuration with env overrides
//! - `state`: Shared application state
//! - `router`: Route table
//! - `handlers`: Market, user, trade and admin handlers
//! - `auth`: Admin token extractor
//! - `error`: `AppError` and status mapping
//! - `rate_limit`: Per-caller token buckets
//! - `snapshots`: Periodic snapshot loop

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod rate_limit;
pub mod router;
pub mod snapshots;
pub mod state;

pub use config::AppConfig;
pub use router::create_router;
pub use state::AppState;
