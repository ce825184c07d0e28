//! Error types for the market
//!
//! Comprehensive error taxonomy using thiserror. Every trade error is
//! reported before any state is touched.

use thiserror::Error;

/// Top-level market error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: String, available: String },

    #[error("Insufficient shares: requested {requested}, held {held}")]
    InsufficientShares { requested: u64, held: u64 },

    #[error("Shares locked: requested {requested}, unlocked {unlocked}, next unlock at tick {next_unlock_tick:?}")]
    LockedShares {
        requested: u64,
        unlocked: u64,
        next_unlock_tick: Option<u64>,
    },

    #[error("Market closed: trading hours are {open} to {close}")]
    MarketClosed { open: String, close: String },

    #[error("Timed out waiting for {resource}")]
    ConcurrencyTimeout { resource: String },

    #[error("Persistence error: {0}")]
    Persistence(#[from] RepositoryError),
}

impl MarketError {
    /// Stable machine-readable code, used in API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::Validation(v) => v.code(),
            MarketError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            MarketError::InsufficientShares { .. } => "INSUFFICIENT_SHARES",
            MarketError::LockedShares { .. } => "LOCKED_SHARES",
            MarketError::MarketClosed { .. } => "MARKET_CLOSED",
            MarketError::ConcurrencyTimeout { .. } => "CONCURRENCY_TIMEOUT",
            MarketError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    /// Whether the same request may succeed if simply retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MarketError::ConcurrencyTimeout { .. }
                | MarketError::Persistence(RepositoryError::Unavailable(_))
        )
    }

    pub fn timeout(resource: impl Into<String>) -> Self {
        MarketError::ConcurrencyTimeout {
            resource: resource.into(),
        }
    }
}

/// Request validation errors (no state change)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid volatility: {0}")]
    InvalidVolatility(String),

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Invalid stock id: {0}")]
    InvalidStockId(String),

    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Unknown stock: {stock_id}")]
    UnknownStock { stock_id: String },

    #[error("Stock delisted: {stock_id}")]
    StockDelisted { stock_id: String },

    #[error("Unknown user: {user_id}")]
    UnknownUser { user_id: String },

    #[error("Stock already exists: {stock_id}")]
    DuplicateStock { stock_id: String },

    #[error("User already registered: {user_id}")]
    DuplicateUser { user_id: String },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::UnknownStock { .. } => "UNKNOWN_STOCK",
            ValidationError::StockDelisted { .. } => "STOCK_DELISTED",
            ValidationError::UnknownUser { .. } => "UNKNOWN_USER",
            ValidationError::DuplicateStock { .. } | ValidationError::DuplicateUser { .. } => {
                "ALREADY_EXISTS"
            }
            _ => "VALIDATION_ERROR",
        }
    }

    /// True for "no such entity" errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ValidationError::UnknownStock { .. } | ValidationError::UnknownUser { .. }
        )
    }
}

/// Storage-level errors surfaced by a repository
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}
