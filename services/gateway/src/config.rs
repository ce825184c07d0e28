//! Gateway configuration
//!
//! One TOML file aggregates the config of every component. The path comes
//! from `MARKET_CONFIG`; when unset or missing, defaults apply.
//! `MARKET_LISTEN_ADDR` and `MARKET_ADMIN_TOKEN` override the file.

use ledger::LedgerConfig;
use persistence::snapshot::SnapshotConfig;
use persistence::{JournalConfig, LockConfig, MemoryRepositoryConfig};
use serde::{Deserialize, Serialize};
use simulation::SimulationConfig;
use std::path::Path;
use thiserror::Error;
use types::session::TradingSession;

pub const CONFIG_PATH_ENV: &str = "MARKET_CONFIG";
pub const LISTEN_ADDR_ENV: &str = "MARKET_LISTEN_ADDR";
pub const ADMIN_TOKEN_ENV: &str = "MARKET_ADMIN_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Token bucket per caller key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Burst size
    pub capacity: u32,
    /// Tokens restored per second
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 20,
            refill_per_sec: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub listen_addr: String,
    /// Admin routes answer 401 while unset
    pub admin_token: Option<String>,
    /// Seed the default listings when the market is empty
    pub seed_listings: bool,
    pub simulation: SimulationConfig,
    pub ledger: LedgerConfig,
    pub locks: LockConfig,
    pub repository: MemoryRepositoryConfig,
    pub snapshot: SnapshotConfig,
    pub journal: JournalConfig,
    pub rate_limit: RateLimitConfig,
    /// Trading hours, shared by the clock and the ledger
    pub session: TradingSession,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            admin_token: None,
            seed_listings: true,
            simulation: SimulationConfig::default(),
            ledger: LedgerConfig::default(),
            locks: LockConfig::default(),
            repository: MemoryRepositoryConfig::default(),
            snapshot: SnapshotConfig::default(),
            journal: JournalConfig::default(),
            rate_limit: RateLimitConfig::default(),
            session: TradingSession::default(),
        }
    }
}

impl AppConfig {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Read `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse { path: display, source })
    }

    /// Load from `MARKET_CONFIG` (default `market.toml`) and apply env overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "market.toml".to_string());
        let mut config = Self::load(Path::new(&path))?;
        config.apply_overrides(
            std::env::var(LISTEN_ADDR_ENV).ok(),
            std::env::var(ADMIN_TOKEN_ENV).ok(),
        );
        Ok(config)
    }

    pub fn apply_overrides(&mut self, listen_addr: Option<String>, admin_token: Option<String>) {
        if let Some(addr) = listen_addr.filter(|a| !a.trim().is_empty()) {
            self.listen_addr = addr;
        }
        if let Some(token) = admin_token.filter(|t| !t.is_empty()) {
            self.admin_token = Some(token);
        }
    }
}
