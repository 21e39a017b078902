//! Age-based retention sweeper for intake and processed artifacts.
//!
//! Orphaned artifacts (crashes, abandoned transcodes) are reclaimed here.
//! The sweep never holds a lock shared with live connection handling, and a
//! failing entry never aborts the sweep of the remaining entries.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RetentionConfig;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub examined: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Delete entries in `dirs` whose modification time is older than
/// `now - max_age`. Per-entry failures (permission errors, races with
/// concurrent deletion) are logged and skipped.
pub fn sweep(dirs: &[PathBuf], max_age: Duration, now: SystemTime) -> SweepStats {
    let cutoff = now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);
    let mut stats = SweepStats::default();

    for dir in dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Retention sweep cannot list {}: {}", dir.display(), e);
                stats.failed += 1;
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Retention sweep skipping unreadable entry: {}", e);
                    stats.failed += 1;
                    continue;
                }
            };

            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            stats.examined += 1;

            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    warn!("Retention sweep cannot stat {}: {}", path.display(), e);
                    stats.failed += 1;
                    continue;
                }
            };

            if modified >= cutoff {
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Retention sweep deleted {}", path.display());
                    stats.deleted += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // Raced with another deleter; nothing to do
                }
                Err(e) => {
                    warn!("Retention sweep failed to delete {}: {}", path.display(), e);
                    stats.failed += 1;
                }
            }
        }
    }

    if stats.deleted > 0 || stats.failed > 0 {
        info!(
            "Retention sweep: examined={}, deleted={}, failed={}",
            stats.examined, stats.deleted, stats.failed
        );
    }

    stats
}

/// Spawn the recurring sweep task. Runs until the token is cancelled.
pub fn spawn_retention_sweeper(
    config: RetentionConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.sweep_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so startup is not a sweep
        ticker.tick().await;

        let dirs = config.directories();
        let max_age = config.max_age();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Retention sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let dirs = dirs.clone();
                    let result = tokio::task::spawn_blocking(move || {
                        sweep(&dirs, max_age, SystemTime::now())
                    })
                    .await;

                    if let Err(e) = result {
                        warn!("Retention sweep task panicked: {}", e);
                    }
                }
            }
        }
    })
}
