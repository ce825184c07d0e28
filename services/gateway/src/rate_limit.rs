use crate::config::RateLimitConfig;
use crate::error::AppError;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Clone)]
struct Bucket {
    capacity: u32,
    tokens: f64,
    refill_rate: f64,
    last_update: Instant,
}

impl Bucket {
    fn new(capacity: u32, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            tokens: capacity as f64,
            refill_rate,
            last_update: now,
        }
    }

    fn allow_request(&mut self, tokens: u32, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        self.tokens = f64::min(self.capacity as f64, self.tokens + elapsed * self.refill_rate);
        self.last_update = now;

        if self.tokens >= tokens as f64 {
            self.tokens -= tokens as f64;
            true
        } else {
            false
        }
    }

    fn is_full(&self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens + elapsed * self.refill_rate >= self.capacity as f64
    }
}

/// Token buckets keyed by caller, e.g. `"alice:trade"`.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    pub fn check(&self, key: &str) -> Result<(), AppError> {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<(), AppError> {
        if !self.config.enabled {
            return Ok(());
        }
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(self.config.capacity, self.config.refill_per_sec, now));

        if bucket.allow_request(1, now) {
            Ok(())
        } else {
            Err(AppError::RateLimitExceeded(format!("Rate limit for {}", key)))
        }
    }

    /// Drop buckets that have refilled completely; they carry no state.
    pub fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_full(now));
        before - self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Interval at which idle buckets are pruned.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(capacity: u32, refill: f64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            enabled: true,
            capacity,
            refill_per_sec: refill,
        })
    }

    #[test]
    fn test_burst_then_reject() {
        let limiter = limiter(3, 1.0);
        let now = Instant::now();
        for _ in 0..3 {
            assert!(limiter.check_at("alice:trade", now).is_ok());
        }
        assert!(matches!(
            limiter.check_at("alice:trade", now),
            Err(AppError::RateLimitExceeded(_))
        ));
        // Other keys are independent
        assert!(limiter.check_at("bob:trade", now).is_ok());
    }

    #[test]
    fn test_refill() {
        let limiter = limiter(1, 2.0);
        let now = Instant::now();
        assert!(limiter.check_at("k", now).is_ok());
        assert!(limiter.check_at("k", now).is_err());
        assert!(limiter.check_at("k", now + Duration::from_millis(600)).is_ok());
    }

    #[test]
    fn test_disabled() {
        let limiter = RateLimiter::new(RateLimitConfig {
            enabled: false,
            capacity: 0,
            refill_per_sec: 0.0,
        });
        assert!(limiter.check("anything").is_ok());
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_prune_idle() {
        let limiter = limiter(5, 1000.0);
        limiter.check("k").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(limiter.prune_idle(), 1);
        assert!(limiter.is_empty());
    }
}
