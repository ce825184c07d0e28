//! Recovery: boot from the latest snapshot plus the journal
//!
//! Recovery process:
//! 1. Find latest snapshot (if any)
//! 2. Load and verify it (version + SHA-256)
//! 3. If it fails verification, fall back to the next older snapshot
//! 4. Replay journal entries newer than the snapshot's sequence
//! 5. Rehydrate a `MemoryRepository` and reopen the journal after the
//!    last replayed entry
//!
//! With no usable snapshot and no journal the market boots empty and the
//! caller seeds it.

use crate::journal::{read_journal, JournalConfig, JournalError, JournalWriter};
use crate::memory::{MarketState, MemoryRepository, MemoryRepositoryConfig, Mutation};
use crate::snapshot::{SnapshotError, SnapshotLoader};
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),
}

// ── Recovery Report ─────────────────────────────────────────────────

/// What recovery found on disk.
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    /// Tick of the restored snapshot, `None` when no snapshot was usable.
    pub snapshot_tick: Option<u64>,
    pub snapshot_path: Option<PathBuf>,
    /// Snapshots skipped because they failed to load.
    pub skipped: Vec<(PathBuf, String)>,
    /// Journal sequence the snapshot covered.
    pub snapshot_sequence: u64,
    /// Journal entries applied on top of the snapshot.
    pub replayed: u64,
    /// Journal entries that could not be applied (corrupt, undecodable or
    /// out of sequence).
    pub discarded: u64,
    pub stocks: usize,
    pub users: usize,
    pub load_time_ms: u64,
}

impl RecoveryReport {
    pub fn is_fresh(&self) -> bool {
        self.snapshot_tick.is_none() && self.replayed == 0
    }
}

// ── Recovery ────────────────────────────────────────────────────────

/// Restore the newest usable snapshot from `dir`.
pub fn recover_state(dir: impl Into<PathBuf>) -> Result<(MarketState, RecoveryReport), SnapshotError> {
    let start = Instant::now();
    let loader = SnapshotLoader::new(dir);
    let mut report = RecoveryReport::default();

    let mut snapshots = loader.list_snapshots()?;
    snapshots.reverse();

    for (tick, path) in snapshots {
        match loader.load(&path) {
            Ok(snapshot) => {
                report.snapshot_tick = Some(tick);
                report.snapshot_path = Some(path);
                report.snapshot_sequence = snapshot.journal_sequence;
                report.stocks = snapshot.state.stocks.len();
                report.users = snapshot.state.users.len();
                report.load_time_ms = start.elapsed().as_millis() as u64;
                info!(
                    tick,
                    journal_sequence = snapshot.journal_sequence,
                    stocks = report.stocks,
                    users = report.users,
                    skipped = report.skipped.len(),
                    load_time_ms = report.load_time_ms,
                    "market state recovered from snapshot"
                );
                return Ok((snapshot.state, report));
            }
            Err(e) => {
                warn!(tick, path = %path.display(), error = %e, "skipping unusable snapshot");
                report.skipped.push((path, e.to_string()));
            }
        }
    }

    report.load_time_ms = start.elapsed().as_millis() as u64;
    info!(skipped = report.skipped.len(), "no usable snapshot");
    Ok((MarketState::default(), report))
}

/// Apply the journal entries that follow `report.snapshot_sequence`.
///
/// Entries are taken strictly in sequence. Older ones are already in the
/// snapshot; ones that do not continue the sequence are counted as
/// discarded. Returns the last applied sequence.
pub fn replay_journal(
    state: &mut MarketState,
    journal: &JournalConfig,
    retention: usize,
    report: &mut RecoveryReport,
) -> Result<u64, JournalError> {
    let scan = read_journal(&journal.dir)?;
    report.discarded += scan.corruption.len() as u64;

    let mut last = report.snapshot_sequence;
    for entry in scan.entries {
        if entry.sequence <= last {
            continue;
        }
        if entry.sequence != last + 1 {
            warn!(expected = last + 1, got = entry.sequence, kind = %entry.kind, "journal entry out of sequence, discarded");
            report.discarded += 1;
            continue;
        }
        match bincode::deserialize::<Mutation>(&entry.payload) {
            Ok(mutation) => {
                state.apply(mutation, retention);
                last = entry.sequence;
                report.replayed += 1;
            }
            Err(e) => {
                warn!(sequence = entry.sequence, kind = %entry.kind, error = %e, "undecodable journal entry, discarded");
                report.discarded += 1;
            }
        }
    }
    Ok(last)
}

/// Recover state and wrap it in a repository, journaled when enabled.
pub fn recover_repository(
    snapshot_dir: impl Into<PathBuf>,
    journal: &JournalConfig,
    config: MemoryRepositoryConfig,
) -> Result<(MemoryRepository, RecoveryReport), RecoveryError> {
    let start = Instant::now();
    let (mut state, mut report) = recover_state(snapshot_dir)?;
    if !journal.enabled {
        return Ok((MemoryRepository::from_state(state, config), report));
    }

    let last = replay_journal(&mut state, journal, config.kline_retention, &mut report)?;
    report.stocks = state.stocks.len();
    report.users = state.users.len();
    report.load_time_ms = start.elapsed().as_millis() as u64;
    if report.replayed > 0 || report.discarded > 0 {
        info!(
            replayed = report.replayed,
            discarded = report.discarded,
            last_sequence = last,
            "journal replayed"
        );
    }

    let writer = JournalWriter::open(journal, last + 1)?;
    Ok((MemoryRepository::from_state(state, config).with_journal(writer), report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{Repository, TradeCommit};
    use crate::snapshot::{Snapshot, SnapshotWriter};
    use rust_decimal::Decimal;
    use std::fs;
    use tempfile::TempDir;
    use types::account::User;
    use types::holding::Holding;
    use types::ids::{StockId, UserId};
    use types::trade::{Side, Transaction};

    fn state_with_user(name: &str) -> MarketState {
        let mut state = MarketState::default();
        let id = UserId::new(name);
        state.users.insert(id.clone(), User::new(id, Decimal::from(100), 0));
        state
    }

    fn journal_in(dir: &TempDir) -> JournalConfig {
        JournalConfig {
            dir: dir.path().join("journal"),
            ..Default::default()
        }
    }

    fn buy(user: &User, qty: u64) -> TradeCommit {
        let mut user = user.clone();
        user.cash_balance -= Decimal::from(10 * qty);
        let mut holding = Holding::new(user.id.clone(), StockId::new("ZY"));
        holding.add_lot(qty, Decimal::from(10), 1, 12);
        let transaction = Transaction::new(
            user.id.clone(),
            StockId::new("ZY"),
            Side::BUY,
            qty,
            Decimal::from(10),
            Decimal::from(10),
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::from(10 * qty),
            1,
            0,
        );
        TradeCommit {
            user,
            holding,
            transaction,
        }
    }

    #[test]
    fn test_fresh_boot() {
        let dir = TempDir::new().unwrap();
        let (state, report) = recover_state(dir.path()).unwrap();
        assert!(report.is_fresh());
        assert_eq!(state, MarketState::default());
    }

    #[tokio::test]
    async fn test_recovers_latest_snapshot() {
        let dir = TempDir::new().unwrap();
        let writer = SnapshotWriter::new(dir.path(), true);
        let mut state = state_with_user("alice");
        state.cycle = Some(Default::default());
        writer.write(&Snapshot::new(0, state, 0, true).unwrap()).unwrap();

        let journal = JournalConfig {
            enabled: false,
            ..journal_in(&dir)
        };
        let (repo, report) =
            recover_repository(dir.path(), &journal, MemoryRepositoryConfig::default()).unwrap();
        assert_eq!(report.snapshot_tick, Some(0));
        assert_eq!(report.users, 1);
        assert!(!repo.is_journaled());
        assert!(repo.get_user(&UserId::new("alice")).await.unwrap().is_some());
    }

    #[test]
    fn test_falls_back_past_corrupt_snapshot() {
        let dir = TempDir::new().unwrap();
        let writer = SnapshotWriter::new(dir.path(), false);

        let mut older = state_with_user("alice");
        older.cycle = Some(types::cycle::MarketCycleState {
            tick_index: 5,
            ..Default::default()
        });
        writer.write(&Snapshot::new(0, older, 0, false).unwrap()).unwrap();

        fs::write(dir.path().join("snapshot-000000000009.snap"), b"garbage").unwrap();

        let (state, report) = recover_state(dir.path()).unwrap();
        assert_eq!(report.snapshot_tick, Some(5));
        assert_eq!(report.skipped.len(), 1);
        assert!(state.users.contains_key(&UserId::new("alice")));
    }

    #[tokio::test]
    async fn test_trade_survives_restart_without_snapshot() {
        let dir = TempDir::new().unwrap();
        let snapshots = dir.path().join("snapshots");
        let journal = journal_in(&dir);
        let alice = User::new(UserId::new("alice"), Decimal::from(1000), 0);

        {
            let (repo, report) =
                recover_repository(&snapshots, &journal, MemoryRepositoryConfig::default()).unwrap();
            assert!(report.is_fresh());
            repo.insert_user(alice.clone()).await.unwrap();
            repo.commit_trade(buy(&alice, 7)).await.unwrap();
        }

        let (repo, report) =
            recover_repository(&snapshots, &journal, MemoryRepositoryConfig::default()).unwrap();
        assert_eq!(report.replayed, 2);
        assert_eq!(report.discarded, 0);

        let holding = repo.get_holding(&alice.id, &StockId::new("ZY")).await.unwrap().unwrap();
        assert_eq!(holding.quantity, 7);
        let user = repo.get_user(&alice.id).await.unwrap().unwrap();
        assert_eq!(user.cash_balance, Decimal::from(930));
        assert_eq!(repo.list_transactions(&alice.id, 10).await.unwrap().len(), 1);

        // Writes after recovery continue the sequence
        repo.commit_trade(buy(&user, 3)).await.unwrap();
        drop(repo);
        let (repo, report) =
            recover_repository(&snapshots, &journal, MemoryRepositoryConfig::default()).unwrap();
        assert_eq!(report.replayed, 3);
        assert_eq!(repo.list_transactions(&alice.id, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_replay_resumes_after_snapshot() {
        let dir = TempDir::new().unwrap();
        let snapshots = dir.path().join("snapshots");
        let journal = journal_in(&dir);
        let alice = User::new(UserId::new("alice"), Decimal::from(1000), 0);
        let bob = User::new(UserId::new("bob"), Decimal::from(1000), 0);

        {
            let (repo, _) =
                recover_repository(&snapshots, &journal, MemoryRepositoryConfig::default()).unwrap();
            repo.insert_user(alice.clone()).await.unwrap();

            let (state, mark) = repo.checkpoint().await.unwrap();
            let mark = mark.unwrap();
            assert_eq!(mark.sequence, 1);
            SnapshotWriter::new(&snapshots, false)
                .write(&Snapshot::new(0, state, mark.sequence, false).unwrap())
                .unwrap();
            assert_eq!(repo.release_journal(mark).unwrap(), 1);

            repo.insert_user(bob.clone()).await.unwrap();
        }

        let (repo, report) =
            recover_repository(&snapshots, &journal, MemoryRepositoryConfig::default()).unwrap();
        assert_eq!(report.snapshot_sequence, 1);
        assert_eq!(report.replayed, 1);
        assert_eq!(repo.list_users().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_torn_journal_tail_is_discarded() {
        let dir = TempDir::new().unwrap();
        let snapshots = dir.path().join("snapshots");
        let journal = journal_in(&dir);

        {
            let (repo, _) =
                recover_repository(&snapshots, &journal, MemoryRepositoryConfig::default()).unwrap();
            repo.insert_user(User::new(UserId::new("alice"), Decimal::from(1), 0))
                .await
                .unwrap();
        }
        let segment = fs::read_dir(&journal.dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .max()
            .unwrap();
        let mut data = fs::read(&segment).unwrap();
        data.extend_from_slice(&[0x40, 0, 0, 0, 1, 2]);
        fs::write(&segment, data).unwrap();

        let (repo, report) =
            recover_repository(&snapshots, &journal, MemoryRepositoryConfig::default()).unwrap();
        assert_eq!(report.replayed, 1);
        assert_eq!(report.discarded, 1);
        assert_eq!(repo.list_users().await.unwrap().len(), 1);
    }
}
