use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::FromRequestParts, http::request::Parts};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Proof that the request carried the configured admin token.
pub struct AdminAuth;

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_token.as_deref() else {
            return Err(AppError::Unauthorized("Admin surface is disabled".into()));
        };

        let provided = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Missing admin token".into()))?
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid header string".into()))?;

        if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
            Ok(AdminAuth)
        } else {
            tracing::warn!(path = %parts.uri.path(), "rejected admin token");
            Err(AppError::Unauthorized("Invalid admin token".into()))
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"token", b"token"));
        assert!(!constant_time_eq(b"token", b"tokex"));
        assert!(!constant_time_eq(b"token", b"tok"));
    }
}
