//! Market snapshots
//!
//! A snapshot file holds the whole `MarketState` plus the last journal
//! sequence it covers, bincode-encoded and optionally zstd-compressed.
//! Files are named `snapshot-{tick:012}.snap[.zst]`; a SHA-256 of the
//! state is checked on load.

use crate::memory::MarketState;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use types::errors::RepositoryError;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Integrity check failed: expected {expected}, got {actual}")]
    IntegrityFailure { expected: String, actual: String },

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("No snapshots found")]
    NoSnapshots,
}

impl From<RepositoryError> for SnapshotError {
    fn from(err: RepositoryError) -> Self {
        SnapshotError::Serialization(err.to_string())
    }
}

impl From<SnapshotError> for RepositoryError {
    fn from(err: SnapshotError) -> Self {
        RepositoryError::Snapshot(err.to_string())
    }
}

// ── Config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    /// Seconds between periodic snapshots
    pub interval_secs: u64,
    pub compress: bool,
    /// Snapshots retained on disk
    pub max_snapshots: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("data/snapshots"),
            interval_secs: 60,
            compress: true,
            max_snapshots: 5,
        }
    }
}

// ── Snapshot ────────────────────────────────────────────────────────

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 2;

/// A complete snapshot of the market at a given tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot format version for forward compatibility.
    pub version: u32,
    /// Last completed tick when the snapshot was taken.
    pub tick: u64,
    /// Unix nanosecond timestamp when snapshot was taken.
    pub timestamp: i64,
    /// Last journal entry reflected in `state`; replay resumes after it.
    pub journal_sequence: u64,
    pub state: MarketState,
    /// SHA-256 hash of the serialized state.
    pub checksum: String,
    /// Whether the data on disk is zstd-compressed.
    pub compressed: bool,
}

impl Snapshot {
    pub fn new(
        timestamp: i64,
        state: MarketState,
        journal_sequence: u64,
        compressed: bool,
    ) -> Result<Self, SnapshotError> {
        let checksum = state.compute_hash()?;
        Ok(Self {
            version: SNAPSHOT_VERSION,
            tick: state.tick_index(),
            timestamp,
            journal_sequence,
            state,
            checksum,
            compressed,
        })
    }

    /// Verify the snapshot's integrity hash.
    pub fn verify_integrity(&self) -> bool {
        matches!(self.state.compute_hash(), Ok(hash) if hash == self.checksum)
    }
}

// ── Snapshot Writer ─────────────────────────────────────────────────

/// Writes snapshots to disk with optional zstd compression.
pub struct SnapshotWriter {
    dir: PathBuf,
    compress: bool,
}

impl SnapshotWriter {
    /// Create a new writer. `compress` enables zstd compression.
    pub fn new(dir: impl Into<PathBuf>, compress: bool) -> Self {
        Self {
            dir: dir.into(),
            compress,
        }
    }

    pub fn from_config(config: &SnapshotConfig) -> Self {
        Self::new(&config.dir, config.compress)
    }

    /// Write a snapshot atomically: serialize → compress → write tmp → fsync → rename.
    ///
    /// Writing twice at the same tick replaces the earlier file.
    pub fn write(&self, snapshot: &Snapshot) -> Result<PathBuf, SnapshotError> {
        fs::create_dir_all(&self.dir)?;

        let data = bincode::serialize(snapshot)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;

        let (final_data, ext) = if self.compress {
            let compressed = zstd::encode_all(data.as_slice(), 3)
                .map_err(|e| SnapshotError::Compression(e.to_string()))?;
            (compressed, "snap.zst")
        } else {
            (data, "snap")
        };

        let filename = format!("snapshot-{:012}.{}", snapshot.tick, ext);
        let path = self.dir.join(&filename);
        let tmp_path = self.dir.join(format!("{}.tmp", filename));

        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&final_data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        info!(
            tick = snapshot.tick,
            bytes = final_data.len(),
            compressed = self.compress,
            path = %path.display(),
            "snapshot written"
        );
        Ok(path)
    }
}

// ── Snapshot Loader ─────────────────────────────────────────────────

/// Loads snapshots from disk, verifying integrity.
pub struct SnapshotLoader {
    dir: PathBuf,
}

impl SnapshotLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load a specific snapshot file.
    pub fn load(&self, path: &Path) -> Result<Snapshot, SnapshotError> {
        let mut file = File::open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let is_compressed = path.extension().map(|e| e == "zst").unwrap_or(false);

        let decompressed = if is_compressed {
            zstd::decode_all(data.as_slice())
                .map_err(|e| SnapshotError::Compression(e.to_string()))?
        } else {
            data
        };

        let snapshot: Snapshot = bincode::deserialize(&decompressed)
            .map_err(|e| SnapshotError::Serialization(e.to_string()))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }

        if !snapshot.verify_integrity() {
            let actual = snapshot.state.compute_hash()?;
            return Err(SnapshotError::IntegrityFailure {
                expected: snapshot.checksum.clone(),
                actual,
            });
        }

        debug!(tick = snapshot.tick, path = %path.display(), "snapshot loaded");
        Ok(snapshot)
    }

    /// Load the snapshot with the highest tick.
    pub fn load_latest(&self) -> Result<Snapshot, SnapshotError> {
        let (_, path) = self
            .list_snapshots()?
            .pop()
            .ok_or(SnapshotError::NoSnapshots)?;
        self.load(&path)
    }

    /// List all snapshots as (tick, path) pairs, ascending.
    pub fn list_snapshots(&self) -> Result<Vec<(u64, PathBuf)>, SnapshotError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("snapshot-") && (name.ends_with(".snap") || name.ends_with(".snap.zst"))
            {
                if let Some(tick) = Self::parse_tick(&name) {
                    results.push((tick, entry.path()));
                }
            }
        }
        results.sort_by_key(|(tick, _)| *tick);
        Ok(results)
    }

    fn parse_tick(filename: &str) -> Option<u64> {
        let stripped = filename
            .trim_start_matches("snapshot-")
            .trim_end_matches(".snap.zst")
            .trim_end_matches(".snap");
        stripped.parse::<u64>().ok()
    }
}

// ── Snapshot Cleanup Policy ─────────────────────────────────────────

/// Policy for cleaning up old snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotCleanupPolicy {
    /// Maximum number of snapshots to retain.
    pub max_snapshots: usize,
}

impl SnapshotCleanupPolicy {
    pub fn new(max_snapshots: usize) -> Self {
        Self { max_snapshots }
    }

    /// Remove old snapshots, keeping only the most recent `max_snapshots`.
    pub fn cleanup(&self, dir: &Path) -> Result<Vec<PathBuf>, SnapshotError> {
        let loader = SnapshotLoader::new(dir);
        let snapshots = loader.list_snapshots()?;

        let mut removed = Vec::new();
        if snapshots.len() > self.max_snapshots {
            let to_remove = snapshots.len() - self.max_snapshots;
            for (_, path) in snapshots.iter().take(to_remove) {
                fs::remove_file(path)?;
                removed.push(path.clone());
            }
        }
        Ok(removed)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use tempfile::TempDir;
    use types::account::User;
    use types::cycle::MarketCycleState;
    use types::holding::Holding;
    use types::ids::{StockId, UserId};
    use types::kline::KlineBar;
    use types::stock::Stock;

    fn sample_state(tick: u64) -> MarketState {
        let mut state = MarketState::default();
        let id = StockId::new("ZY");
        state.stocks.insert(
            id.clone(),
            Stock::new(id.clone(), "Zhiyun", Decimal::from(57), Decimal::new(22, 3), "tech", 1).unwrap(),
        );
        state
            .klines
            .entry(id.clone())
            .or_default()
            .push_back(KlineBar::flat(id.clone(), tick, 5, Decimal::from(57)));

        let user = UserId::new("alice");
        state
            .users
            .insert(user.clone(), User::new(user.clone(), Decimal::new(1_000_000, 2), 1));
        let mut holding = Holding::new(user.clone(), id.clone());
        holding.add_lot(10, Decimal::from(57), tick, 12);
        state.holdings.entry(user).or_default().insert(id, holding);

        let mut cycle = MarketCycleState::default();
        cycle.tick_index = tick;
        state.cycle = Some(cycle);
        state
    }

    #[test]
    fn test_snapshot_write_and_load_uncompressed() {
        let dir = TempDir::new().unwrap();
        let writer = SnapshotWriter::new(dir.path(), false);
        let snapshot = Snapshot::new(1_000, sample_state(42), 9, false).unwrap();

        let path = writer.write(&snapshot).unwrap();
        assert!(path.to_string_lossy().ends_with("snapshot-000000000042.snap"));

        let loaded = SnapshotLoader::new(dir.path()).load(&path).unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.tick, 42);
        assert_eq!(loaded.journal_sequence, 9);
    }

    #[test]
    fn test_snapshot_write_and_load_compressed() {
        let dir = TempDir::new().unwrap();
        let writer = SnapshotWriter::new(dir.path(), true);
        let snapshot = Snapshot::new(1_000, sample_state(7), 0, true).unwrap();

        writer.write(&snapshot).unwrap();
        let loaded = SnapshotLoader::new(dir.path()).load_latest().unwrap();
        assert_eq!(loaded.state, snapshot.state);
    }

    #[test]
    fn test_snapshot_integrity_detects_tamper() {
        let mut snapshot = Snapshot::new(0, sample_state(1), 0, false).unwrap();
        assert!(snapshot.verify_integrity());

        if let Some(stock) = snapshot.state.stocks.values_mut().next() {
            stock.current_price = Decimal::from(1);
        }
        assert!(!snapshot.verify_integrity());
    }

    #[test]
    fn test_tampered_file_fails_to_load() {
        let dir = TempDir::new().unwrap();
        let writer = SnapshotWriter::new(dir.path(), false);
        let mut snapshot = Snapshot::new(0, sample_state(3), 0, false).unwrap();
        snapshot.checksum = "0".repeat(64);
        let path = writer.write(&snapshot).unwrap();

        let err = SnapshotLoader::new(dir.path()).load(&path).unwrap_err();
        assert!(matches!(err, SnapshotError::IntegrityFailure { .. }));
    }

    #[test]
    fn test_snapshot_without_journal_sequence_is_refused() {
        let dir = TempDir::new().unwrap();
        let writer = SnapshotWriter::new(dir.path(), false);
        let mut snapshot = Snapshot::new(0, sample_state(4), 0, false).unwrap();
        snapshot.version = 1;
        let path = writer.write(&snapshot).unwrap();

        let err = SnapshotLoader::new(dir.path()).load(&path).unwrap_err();
        assert!(matches!(err, SnapshotError::UnsupportedVersion(1)));
    }

    #[test]
    fn test_load_latest_picks_highest_tick() {
        let dir = TempDir::new().unwrap();
        let writer = SnapshotWriter::new(dir.path(), false);
        for tick in [5, 20, 10] {
            writer.write(&Snapshot::new(0, sample_state(tick), tick, false).unwrap()).unwrap();
        }
        let latest = SnapshotLoader::new(dir.path()).load_latest().unwrap();
        assert_eq!(latest.tick, 20);
    }

    #[test]
    fn test_empty_dir_has_no_snapshots() {
        let dir = TempDir::new().unwrap();
        let err = SnapshotLoader::new(dir.path().join("missing")).load_latest().unwrap_err();
        assert!(matches!(err, SnapshotError::NoSnapshots));
    }

    #[test]
    fn test_cleanup_keeps_most_recent() {
        let dir = TempDir::new().unwrap();
        let writer = SnapshotWriter::new(dir.path(), false);
        for tick in 1..=5 {
            writer.write(&Snapshot::new(0, sample_state(tick), tick, false).unwrap()).unwrap();
        }

        let removed = SnapshotCleanupPolicy::new(2).cleanup(dir.path()).unwrap();
        assert_eq!(removed.len(), 3);

        let remaining: Vec<u64> = SnapshotLoader::new(dir.path())
            .list_snapshots()
            .unwrap()
            .into_iter()
            .map(|(tick, _)| tick)
            .collect();
        assert_eq!(remaining, vec![4, 5]);
    }
}
