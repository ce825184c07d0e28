//! Periodic snapshot loop
//!
//! Checkpoints the in-memory market, writes it on a blocking thread, trims
//! old files and then drops the journal segments the snapshot covers. Idle
//! lock and rate-limit entries are pruned on the same beat.

use crate::state::AppState;
use persistence::MemoryRepository;
use persistence::snapshot::{Snapshot, SnapshotCleanupPolicy, SnapshotConfig, SnapshotError, SnapshotWriter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use types::time::now_nanos;

/// Write one snapshot of `repo`, apply the retention policy and truncate
/// the journal up to the snapshot.
pub async fn write_snapshot(
    repo: &MemoryRepository,
    config: &SnapshotConfig,
) -> Result<PathBuf, SnapshotError> {
    let (state, mark) = repo.checkpoint().await?;
    let sequence = mark.map(|m| m.sequence).unwrap_or(0);
    let config = config.clone();

    let joined = tokio::task::spawn_blocking(move || {
        let snapshot = Snapshot::new(now_nanos(), state, sequence, config.compress)?;
        let path = SnapshotWriter::from_config(&config).write(&snapshot)?;
        let removed = SnapshotCleanupPolicy::new(config.max_snapshots).cleanup(&config.dir)?;
        if !removed.is_empty() {
            debug!(removed = removed.len(), "old snapshots removed");
        }
        Ok::<_, SnapshotError>(path)
    })
    .await;

    let path = match joined {
        Ok(result) => result?,
        Err(e) => return Err(SnapshotError::Serialization(format!("snapshot task failed: {e}"))),
    };

    if let Some(mark) = mark {
        match repo.release_journal(mark) {
            Ok(removed) => debug!(removed, sequence = mark.sequence, "journal truncated"),
            Err(e) => warn!(error = %e, "journal truncation failed"),
        }
    }
    Ok(path)
}

pub async fn run_snapshot_loop(
    repo: Arc<MemoryRepository>,
    state: AppState,
    config: SnapshotConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = Duration::from_secs(config.interval_secs.max(1));
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        dir = %config.dir.display(),
        interval_secs = period.as_secs(),
        enabled = config.enabled,
        "snapshot loop started"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if config.enabled {
                    if let Err(e) = write_snapshot(&repo, &config).await {
                        error!(error = %e, "snapshot failed");
                    }
                }
                let locks = state.locks.prune_idle();
                let buckets = state.rate_limiter.prune_idle();
                if locks + buckets > 0 {
                    debug!(locks, buckets, "idle entries pruned");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    if config.enabled {
        if let Err(e) = write_snapshot(&repo, &config).await {
            warn!(error = %e, "final snapshot failed");
        }
    }
    info!("snapshot loop stopped");
}
