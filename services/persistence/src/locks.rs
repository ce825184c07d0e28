//! Per-key exclusive sections
//!
//! Trades lock their user, then their stock. Simulation ticks and admin
//! stock edits lock only the stock. Keeping that order everywhere rules
//! out lock cycles.
//!
//! Every acquisition and every storage round-trip made under a lock is
//! bounded; expiry surfaces as `ConcurrencyTimeout` before anything is
//! written.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;
use types::errors::{MarketError, RepositoryError};
use types::ids::{StockId, UserId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Max wait for a per-key lock
    pub lock_timeout_ms: u64,
    /// Max duration of a single storage call
    pub storage_timeout_ms: u64,
}

impl LockConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2_000,
            storage_timeout_ms: 2_000,
        }
    }
}

/// A map of independent async mutexes, one per key.
pub struct KeyedMutex<K> {
    name: &'static str,
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> KeyedMutex<K>
where
    K: Eq + Hash + Clone + Display,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            locks: DashMap::new(),
        }
    }

    /// Acquire the lock for `key`, waiting at most `timeout`.
    pub async fn lock(&self, key: &K, timeout: Duration) -> Result<OwnedMutexGuard<()>, MarketError> {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                warn!(lock = self.name, key = %key, timeout_ms = timeout.as_millis() as u64, "lock acquisition timed out");
                Err(MarketError::timeout(format!("{}:{}", self.name, key)))
            }
        }
    }

    /// Drop entries nobody holds or waits on.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, m| Arc::strong_count(m) > 1);
        before - self.locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Guards held by a trade: user first, then stock.
pub struct TradeGuard {
    _user: OwnedMutexGuard<()>,
    _stock: OwnedMutexGuard<()>,
}

/// Process-wide lock tables shared by the ledger, the clock and admin.
pub struct MarketLocks {
    pub users: KeyedMutex<UserId>,
    pub stocks: KeyedMutex<StockId>,
    config: LockConfig,
}

impl MarketLocks {
    pub fn new(config: LockConfig) -> Self {
        Self {
            users: KeyedMutex::new("user"),
            stocks: KeyedMutex::new("stock"),
            config,
        }
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    pub async fn lock_user(&self, id: &UserId) -> Result<OwnedMutexGuard<()>, MarketError> {
        self.users.lock(id, self.config.lock_timeout()).await
    }

    pub async fn lock_stock(&self, id: &StockId) -> Result<OwnedMutexGuard<()>, MarketError> {
        self.stocks.lock(id, self.config.lock_timeout()).await
    }

    /// Lock a (user, stock) pair in the canonical order.
    pub async fn lock_trade(&self, user: &UserId, stock: &StockId) -> Result<TradeGuard, MarketError> {
        let user_guard = self.lock_user(user).await?;
        let stock_guard = self.lock_stock(stock).await?;
        Ok(TradeGuard {
            _user: user_guard,
            _stock: stock_guard,
        })
    }

    /// Run one storage call under the configured storage timeout.
    pub async fn storage<T, F>(&self, resource: &str, fut: F) -> Result<T, MarketError>
    where
        F: Future<Output = Result<T, RepositoryError>>,
    {
        with_storage_timeout(self.config.storage_timeout(), resource, fut).await
    }

    pub fn prune_idle(&self) -> usize {
        self.users.prune_idle() + self.stocks.prune_idle()
    }
}

impl Default for MarketLocks {
    fn default() -> Self {
        Self::new(LockConfig::default())
    }
}

/// Bound a storage future; expiry is a retryable `ConcurrencyTimeout`.
pub async fn with_storage_timeout<T, F>(
    timeout: Duration,
    resource: &str,
    fut: F,
) -> Result<T, MarketError>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(MarketError::from),
        Err(_) => {
            warn!(resource, timeout_ms = timeout.as_millis() as u64, "storage call timed out");
            Err(MarketError::timeout(format!("storage:{resource}")))
        }
    }
}
