//! Trading hours
//!
//! The market trades inside one daily window in a fixed UTC offset. The
//! window may wrap past midnight. A disabled session is always open.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingSession {
    pub enabled: bool,
    /// Local opening time, inclusive
    pub open: NaiveTime,
    /// Local closing time, inclusive
    pub close: NaiveTime,
    /// Offset of local market time from UTC
    pub utc_offset_minutes: i32,
}

impl Default for TradingSession {
    fn default() -> Self {
        Self {
            enabled: false,
            open: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default(),
            utc_offset_minutes: 480,
        }
    }
}

impl TradingSession {
    /// Whether trading is allowed at `now`.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return true;
        }
        let local = (now + Duration::minutes(i64::from(self.utc_offset_minutes))).time();
        if self.open <= self.close {
            local >= self.open && local <= self.close
        } else {
            local >= self.open || local <= self.close
        }
    }

    pub fn is_open_now(&self) -> bool {
        self.is_open_at(Utc::now())
    }

    pub fn status_now(&self) -> MarketStatus {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> MarketStatus {
        if self.is_open_at(now) {
            MarketStatus::Open
        } else {
            MarketStatus::Closed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Open,
    Closed,
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketStatus::Open => write!(f, "open"),
            MarketStatus::Closed => write!(f, "closed"),
        }
    }
}
