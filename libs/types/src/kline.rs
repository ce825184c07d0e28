//! K-line (OHLCV) bars
//!
//! One bar per stock per tick, append-only. Longer periods are derived by
//! aggregating consecutive tick bars aligned on `tick / period`.
//! Gaps are backfilled with flat bars at the previous close and zero volume.

use crate::ids::StockId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single OHLCV bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlineBar {
    pub stock_id: StockId,
    /// Tick index; the dedup key within a stock's sequence
    pub tick: u64,
    /// Tick boundary, Unix nanos
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Shares traded during the tick
    pub volume: u64,
}

impl KlineBar {
    /// Create a flat (no-movement) bar for backfill.
    pub fn flat(stock_id: StockId, tick: u64, timestamp: i64, prev_close: Decimal) -> Self {
        Self {
            stock_id,
            tick,
            timestamp,
            open: prev_close,
            high: prev_close,
            low: prev_close,
            close: prev_close,
            volume: 0,
        }
    }

    /// Validate bar integrity (OHLC invariants).
    pub fn is_valid(&self) -> bool {
        self.high >= self.open
            && self.high >= self.close
            && self.high >= self.low
            && self.low <= self.open
            && self.low <= self.close
            && self.low > Decimal::ZERO
    }

    /// Close-to-open change of this bar.
    pub fn change(&self) -> Decimal {
        self.close - self.open
    }
}

/// Aggregate tick bars into `period`-tick bars.
///
/// Input must be sorted by tick. Buckets are aligned on `tick / period`,
/// so a 12-tick period always starts at a multiple of 12.
pub fn aggregate(bars: &[KlineBar], period: u64) -> Vec<KlineBar> {
    if period <= 1 {
        return bars.to_vec();
    }

    let mut out: Vec<KlineBar> = Vec::new();
    for bar in bars {
        let bucket_start = (bar.tick / period) * period;
        match out.last_mut() {
            Some(current) if current.tick == bucket_start => {
                current.high = current.high.max(bar.high);
                current.low = current.low.min(bar.low);
                current.close = bar.close;
                current.volume += bar.volume;
            }
            _ => out.push(KlineBar {
                tick: bucket_start,
                ..bar.clone()
            }),
        }
    }
    out
}

/// Simple moving average of the last `n` closes.
///
/// Returns `None` when fewer than `n` bars are available.
pub fn sma(bars: &[KlineBar], n: usize) -> Option<Decimal> {
    if n == 0 || bars.len() < n {
        return None;
    }
    let sum: Decimal = bars[bars.len() - n..].iter().map(|b| b.close).sum();
    Some(sum / Decimal::from(n as u64))
}
