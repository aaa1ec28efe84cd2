// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use stevedore_core::{Archiver, Config};

use crate::jobs::{ActiveArtifacts, JobRegistry, JobRunner};
use crate::lock::LockStore;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Validated runtime configuration.
    pub config: Config,
    /// Authoritative job state. The only shared mutable state in-process.
    pub registry: Arc<JobRegistry>,
    /// Spawns background tasks that drive jobs via the archiver.
    pub runner: JobRunner,
    /// Paths currently owned by running jobs (reaper guard).
    pub artifacts: Arc<ActiveArtifacts>,
    /// Cross-session operation lock.
    pub lock: Arc<LockStore>,
}

impl AppState {
    /// Create the application state wrapped in an Arc for sharing.
    pub fn new(config: Config, archiver: Arc<dyn Archiver>) -> Arc<Self> {
        let registry = Arc::new(JobRegistry::new());
        let artifacts = Arc::new(ActiveArtifacts::new());
        let runner = JobRunner::new(Arc::clone(&registry), archiver, Arc::clone(&artifacts));
        let lock = Arc::new(LockStore::new(&config.temp_dir));
        Arc::new(Self {
            start_time: Instant::now(),
            config,
            registry,
            runner,
            artifacts,
            lock,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
