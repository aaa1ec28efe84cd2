// crates/server/src/lock.rs
//! Cross-session single-flight lock for bulk operations.
//!
//! The lock record is a JSON file in the state directory, so every session
//! (and anything else sharing that filesystem) observes the same record.
//! Acquisition is advisory: it always succeeds and the last writer wins.
//! Two near-simultaneous acquisitions can therefore both proceed within
//! one polling interval; see DESIGN.md for the open question on hardening.
//!
//! Observers converge through two channels: a `notify` watcher on the
//! state directory for out-of-band changes, and a fixed 500 ms re-poll
//! for readers the watcher cannot reach. In-process subscribers get a
//! `tokio::sync::watch` feed.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::jobs::{JobId, JobKind};

/// How often observers re-read the lock record as a watcher fallback.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Name of the lock record file inside the state directory.
pub const LOCK_FILE_NAME: &str = "operation-lock.json";

/// "An operation is currently claimed."
///
/// At most one record exists per coordination scope at any observed
/// instant within one polling interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationLock {
    pub kind: JobKind,
    pub job_id: JobId,
    pub started_at: DateTime<Utc>,
}

/// Shared lock store backed by a file in the state directory.
pub struct LockStore {
    path: PathBuf,
    current: RwLock<Option<OperationLock>>,
    tx: watch::Sender<Option<OperationLock>>,
}

impl LockStore {
    /// Open the store for `state_dir`, loading any existing lock record.
    pub fn new(state_dir: &Path) -> Self {
        let path = state_dir.join(LOCK_FILE_NAME);
        let initial = read_lock_file(&path);
        let (tx, _) = watch::channel(initial.clone());
        Self {
            path,
            current: RwLock::new(initial),
            tx,
        }
    }

    /// Claim the lock. Advisory — always succeeds, replacing any holder.
    pub fn acquire(&self, kind: JobKind, job_id: JobId) -> std::io::Result<OperationLock> {
        let lock = OperationLock {
            kind,
            job_id,
            started_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&lock).map_err(std::io::Error::other)?;
        std::fs::write(&self.path, bytes)?;
        tracing::info!(job_id = %job_id, kind = ?kind, "Operation lock acquired");
        self.update_cache(Some(lock.clone()));
        Ok(lock)
    }

    /// Clear the lock. Releasing an absent lock is a no-op.
    pub fn release(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::info!("Operation lock released"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.update_cache(None);
        Ok(())
    }

    /// Last observed lock record.
    pub fn current(&self) -> Option<OperationLock> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading lock cache: {e}");
                None
            }
        }
    }

    pub fn is_held(&self) -> bool {
        self.current().is_some()
    }

    /// Re-read the backing file and publish any change to subscribers.
    pub fn reload(&self) -> Option<OperationLock> {
        let lock = read_lock_file(&self.path);
        self.update_cache(lock.clone());
        lock
    }

    /// Observe lock changes seen by this process.
    pub fn subscribe(&self) -> watch::Receiver<Option<OperationLock>> {
        self.tx.subscribe()
    }

    fn update_cache(&self, lock: Option<OperationLock>) {
        match self.current.write() {
            Ok(mut guard) => {
                if *guard != lock {
                    *guard = lock.clone();
                    let _ = self.tx.send(lock);
                }
            }
            Err(e) => tracing::error!("RwLock poisoned writing lock cache: {e}"),
        }
    }
}

fn read_lock_file(path: &Path) -> Option<OperationLock> {
    match std::fs::read(path) {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(lock) => Some(lock),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed lock file");
                None
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to read lock file");
            None
        }
    }
}

/// Start watching the lock file for external changes.
///
/// Combines filesystem notifications with a fixed-interval re-poll so all
/// observers converge within one interval even when notifications are
/// lost. The returned watcher must be kept alive for the duration of
/// monitoring (dropping it stops the watch; the poll task keeps going).
pub fn spawn_watcher(
    store: Arc<LockStore>,
    poll: Duration,
) -> notify::Result<RecommendedWatcher> {
    let (tx, mut rx) = mpsc::channel::<()>(16);
    let lock_path = store.path.clone();
    let mut watcher = notify::recommended_watcher(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if event.paths.iter().any(|p| p == &lock_path) {
                    let _ = tx.blocking_send(());
                }
            }
            Err(e) => tracing::warn!(error = %e, "Lock watcher error"),
        },
    )?;

    // Watch the directory, not the file: the file comes and goes with
    // acquire/release.
    let dir = store
        .path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(poll);
        ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    store.reload();
                }
                changed = rx.recv() => {
                    match changed {
                        Some(()) => { store.reload(); }
                        None => break,
                    }
                }
            }
        }
    });

    Ok(watcher)
}
