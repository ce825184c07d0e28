use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use types::errors::{MarketError, RepositoryError, ValidationError};

/// Central error type for the gateway
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Market(#[from] MarketError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Market(err.into())
    }
}

/// Error payload, also embedded in per-stock liquidation results.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl From<&MarketError> for ErrorBody {
    fn from(err: &MarketError) -> Self {
        Self {
            error: err.code(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

pub fn market_status(err: &MarketError) -> StatusCode {
    match err {
        MarketError::Validation(v) if v.is_not_found() => StatusCode::NOT_FOUND,
        MarketError::Validation(
            ValidationError::DuplicateStock { .. } | ValidationError::DuplicateUser { .. },
        ) => StatusCode::CONFLICT,
        MarketError::Validation(_) => StatusCode::BAD_REQUEST,
        MarketError::InsufficientFunds { .. }
        | MarketError::InsufficientShares { .. }
        | MarketError::LockedShares { .. }
        | MarketError::MarketClosed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        MarketError::ConcurrencyTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        MarketError::Persistence(RepositoryError::NotFound { .. }) => StatusCode::NOT_FOUND,
        MarketError::Persistence(RepositoryError::Conflict(_)) => StatusCode::CONFLICT,
        MarketError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Market(err) => (market_status(&err), ErrorBody::from(&err)),
            AppError::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: "UNAUTHORIZED",
                    message,
                    retryable: false,
                },
            ),
            AppError::RateLimitExceeded(message) => (
                StatusCode::TOO_MANY_REQUESTS,
                ErrorBody {
                    error: "RATE_LIMIT_EXCEEDED",
                    message,
                    retryable: true,
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let unknown: MarketError = ValidationError::UnknownStock { stock_id: "XX".into() }.into();
        assert_eq!(market_status(&unknown), StatusCode::NOT_FOUND);

        let dup: MarketError = ValidationError::DuplicateUser { user_id: "alice".into() }.into();
        assert_eq!(market_status(&dup), StatusCode::CONFLICT);

        let qty: MarketError = ValidationError::InvalidQuantity("0".into()).into();
        assert_eq!(market_status(&qty), StatusCode::BAD_REQUEST);

        let locked = MarketError::LockedShares {
            requested: 5,
            unlocked: 0,
            next_unlock_tick: Some(10),
        };
        assert_eq!(market_status(&locked), StatusCode::UNPROCESSABLE_ENTITY);

        let closed = MarketError::MarketClosed {
            open: "08:00:00".into(),
            close: "23:59:59".into(),
        };
        assert_eq!(market_status(&closed), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ErrorBody::from(&closed).error, "MARKET_CLOSED");

        assert_eq!(market_status(&MarketError::timeout("user alice")), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_body_carries_code() {
        let err = MarketError::timeout("stock ZY");
        let body = ErrorBody::from(&err);
        assert_eq!(body.error, "CONCURRENCY_TIMEOUT");
        assert!(body.retryable);
    }
}
