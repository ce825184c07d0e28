//! Types library for the virtual stock market
//!
//! Core type definitions shared by the simulation, ledger, persistence
//! and gateway crates. All money is `rust_decimal::Decimal`.
//!
//! # Modules
//! - `ids`: Identifiers (StockId, UserId, TransactionId, EventId)
//! - `numeric`: Decimal precision and rounding rules
//! - `time`: Timestamp helpers
//! - `session`: Trading hours and market status
//! - `stock`: Listed stock state and admin patches
//! - `kline`: OHLCV bars, aggregation, moving averages
//! - `cycle`: Macro and volatility regimes
//! - `event`: Transient market events
//! - `account`: User cash accounts
//! - `holding`: Share holdings with lock-up lots
//! - `trade`: Executed transactions
//! - `errors`: Error taxonomy

pub mod ids;
pub mod numeric;
pub mod time;
pub mod session;
pub mod stock;
pub mod kline;
pub mod cycle;
pub mod event;
pub mod account;
pub mod holding;
pub mod trade;
pub mod errors;
