//! Identifier types for market entities
//!
//! Tickers and user ids are caller-supplied strings; transactions and
//! events use UUID v7 so they sort chronologically.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum ticker length accepted by [`StockId::try_new`].
pub const MAX_TICKER_LEN: usize = 8;

/// Stock ticker (e.g. "ZY", "TX")
///
/// Always stored upper-case, 1..=8 ASCII alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StockId(String);

impl StockId {
    /// Create a new StockId from a ticker
    ///
    /// # Panics
    /// Panics if the ticker is empty, too long or not alphanumeric
    pub fn new(ticker: impl Into<String>) -> Self {
        Self::try_new(ticker).expect("StockId must be 1-8 ASCII alphanumeric characters")
    }

    /// Try to create a StockId, returning None if invalid
    pub fn try_new(ticker: impl Into<String>) -> Option<Self> {
        let s = ticker.into().trim().to_ascii_uppercase();
        let valid = !s.is_empty()
            && s.len() <= MAX_TICKER_LEN
            && s.chars().all(|c| c.is_ascii_alphanumeric());
        valid.then_some(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StockId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// User identifier, as issued by the chat platform or API client
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// # Panics
    /// Panics if the id is blank
    pub fn new(id: impl Into<String>) -> Self {
        Self::try_new(id).expect("UserId must not be blank")
    }

    pub fn try_new(id: impl Into<String>) -> Option<Self> {
        let s = id.into();
        let trimmed = s.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Unique identifier for an executed trade
///
/// Uses UUID v7 so a user's transaction log sorts by execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a market event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_id_normalizes_case() {
        let id = StockId::new("zy");
        assert_eq!(id.as_str(), "ZY");
    }

    #[test]
    fn test_stock_id_try_new() {
        assert!(StockId::try_new("TX").is_some());
        assert!(StockId::try_new(" hl ").is_some());
        assert!(StockId::try_new("").is_none());
        assert!(StockId::try_new("TOOLONGID").is_none());
        assert!(StockId::try_new("A/B").is_none());
    }

    #[test]
    #[should_panic(expected = "StockId must be 1-8 ASCII alphanumeric characters")]
    fn test_stock_id_invalid_format() {
        StockId::new("бад");
    }

    #[test]
    fn test_stock_id_serialization() {
        let id = StockId::new("DF");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"DF\"");
    }

    #[test]
    fn test_user_id_rejects_blank() {
        assert!(UserId::try_new("   ").is_none());
        assert_eq!(UserId::new(" alice ").as_str(), "alice");
    }

    #[test]
    fn test_transaction_id_creation() {
        let id1 = TransactionId::new();
        let id2 = TransactionId::new();
        assert_ne!(id1, id2, "TransactionIds should be unique");
    }
}
