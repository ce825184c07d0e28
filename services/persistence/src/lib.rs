//! Persistence for the virtual stock market
//!
//! The [`Repository`](repository::Repository) trait is the durable-store
//! boundary used by the simulation clock and the trading ledger. This crate
//! ships an in-memory implementation that journals every write, is
//! periodically written to integrity-checked snapshot files and is restored
//! at boot from the latest snapshot plus the journal tail.
//!
//! # Modules
//! - `repository`: Repository trait and commit units
//! - `memory`: In-memory repository (BTreeMap state, kline retention)
//! - `locks`: Per-key async mutexes and storage timeouts
//! - `journal`: Write-ahead journal (length-prefixed, CRC32C)
//! - `snapshot`: Snapshot files (bincode, SHA-256, optional zstd)
//! - `recovery`: Boot-time restore from snapshot plus journal replay

pub mod repository;
pub mod memory;
pub mod locks;
pub mod journal;
pub mod snapshot;
pub mod recovery;

pub use journal::JournalConfig;
pub use locks::{KeyedMutex, LockConfig, MarketLocks};
pub use memory::{MarketState, MemoryRepository, MemoryRepositoryConfig, Mutation};
pub use repository::{AppendOutcome, Repository, TradeCommit};
