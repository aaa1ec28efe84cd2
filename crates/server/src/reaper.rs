// crates/server/src/reaper.rs
//! Periodic eviction of expired jobs and stale temp artifacts.
//!
//! Two independent sweeps run on the same period: job records past the
//! retention window leave the registry, and temp files past the max age
//! leave the working directory. Each file is handled on its own — one
//! failed removal never aborts the rest of the sweep.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stevedore_core::Config;

use crate::jobs::{ActiveArtifacts, JobRegistry};

/// Outcome of one sweep, for logging and tests.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub jobs_removed: usize,
    pub files_removed: usize,
    pub file_errors: usize,
}

pub struct Reaper {
    registry: Arc<JobRegistry>,
    artifacts: Arc<ActiveArtifacts>,
    temp_dir: PathBuf,
    job_retention: Duration,
    max_file_age: Duration,
}

impl Reaper {
    pub fn new(
        registry: Arc<JobRegistry>,
        artifacts: Arc<ActiveArtifacts>,
        temp_dir: PathBuf,
        job_retention: Duration,
        max_file_age: Duration,
    ) -> Self {
        Self {
            registry,
            artifacts,
            temp_dir,
            job_retention,
            max_file_age,
        }
    }

    pub fn from_config(
        config: &Config,
        registry: Arc<JobRegistry>,
        artifacts: Arc<ActiveArtifacts>,
    ) -> Self {
        Self::new(
            registry,
            artifacts,
            config.temp_dir.clone(),
            config.job_retention,
            config.max_file_age,
        )
    }

    /// One full sweep: registry retention, then temp-file age.
    pub fn run_once(&self) -> SweepStats {
        let jobs_removed = self.registry.sweep(self.job_retention);
        let (files_removed, file_errors) = self.sweep_temp_files();
        let stats = SweepStats {
            jobs_removed,
            files_removed,
            file_errors,
        };
        if stats != SweepStats::default() {
            tracing::info!(
                jobs_removed = stats.jobs_removed,
                files_removed = stats.files_removed,
                file_errors = stats.file_errors,
                "Reaper sweep complete"
            );
        }
        stats
    }

    fn sweep_temp_files(&self) -> (usize, usize) {
        let entries = match std::fs::read_dir(&self.temp_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return (0, 0),
            Err(e) => {
                tracing::error!(dir = %self.temp_dir.display(), error = %e, "Cannot read temp dir");
                return (0, 1);
            }
        };

        let mut removed = 0;
        let mut errors = 0;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable temp dir entry");
                    errors += 1;
                    continue;
                }
            };
            let path = entry.path();

            // Never race a running job for its own artifact.
            if self.artifacts.contains(&path) {
                continue;
            }

            // The lock record shares the directory but is not an artifact.
            if path.file_name().and_then(|n| n.to_str()) == Some(crate::lock::LOCK_FILE_NAME) {
                continue;
            }

            let age = entry
                .metadata()
                .ok()
                .filter(|m| m.is_file())
                .and_then(|m| m.modified().ok())
                .and_then(|mtime| mtime.elapsed().ok());
            let Some(age) = age else { continue };

            if age > self.max_file_age {
                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        tracing::debug!(path = %path.display(), "Removed stale temp file");
                        removed += 1;
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to remove temp file");
                        errors += 1;
                    }
                }
            }
        }
        (removed, errors)
    }

    /// Run sweeps forever on `interval`. The task lives for the whole
    /// process, like the server's other periodic background work.
    pub fn spawn(self, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so startup isn't
            // spent sweeping a directory we just created.
            ticks.tick().await;
            loop {
                ticks.tick().await;
                self.run_once();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobKind;
    use serde_json::json;

    fn reaper_with(
        dir: &std::path::Path,
        job_retention: Duration,
        max_file_age: Duration,
    ) -> (Arc<JobRegistry>, Arc<ActiveArtifacts>, Reaper) {
        let registry = Arc::new(JobRegistry::new());
        let artifacts = Arc::new(ActiveArtifacts::new());
        let reaper = Reaper::new(
            Arc::clone(&registry),
            Arc::clone(&artifacts),
            dir.to_path_buf(),
            job_retention,
            max_file_age,
        );
        (registry, artifacts, reaper)
    }

    #[test]
    fn test_sweeps_expired_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _, reaper) = reaper_with(dir.path(), Duration::from_millis(10), Duration::from_secs(3600));

        let id = registry.create(JobKind::Export, json!({}));
        registry.set_completed(id, json!({}));
        std::thread::sleep(Duration::from_millis(20));

        let stats = reaper.run_once();
        assert_eq!(stats.jobs_removed, 1);
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn test_sweeps_old_files_keeps_fresh_ones() {
        let dir = tempfile::tempdir().unwrap();
        // Retention long for jobs, zero-ish for files.
        let (_, _, reaper) = reaper_with(dir.path(), Duration::from_secs(3600), Duration::ZERO);

        let stale = dir.path().join("export-old.tar.gz");
        std::fs::write(&stale, b"old").unwrap();
        std::thread::sleep(Duration::from_millis(10));

        let stats = reaper.run_once();
        assert_eq!(stats.files_removed, 1);
        assert_eq!(stats.file_errors, 0);
        assert!(!stale.exists());
    }

    #[test]
    fn test_skips_active_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (_, artifacts, reaper) = reaper_with(dir.path(), Duration::from_secs(3600), Duration::ZERO);

        let active = dir.path().join("export-live.tar.gz");
        std::fs::write(&active, b"in progress").unwrap();
        artifacts.insert_all(std::slice::from_ref(&active));
        std::thread::sleep(Duration::from_millis(10));

        let stats = reaper.run_once();
        assert_eq!(stats.files_removed, 0);
        assert!(active.exists());

        // Once the job lets go the next sweep takes it.
        artifacts.remove_all(std::slice::from_ref(&active));
        let stats = reaper.run_once();
        assert_eq!(stats.files_removed, 1);
        assert!(!active.exists());
    }

    #[test]
    fn test_missing_temp_dir_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("never-created");
        let (_, _, reaper) = reaper_with(&gone, Duration::from_secs(3600), Duration::ZERO);
        assert_eq!(reaper.run_once(), SweepStats::default());
    }

    #[test]
    fn test_directories_are_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let (_, _, reaper) = reaper_with(dir.path(), Duration::from_secs(3600), Duration::ZERO);
        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        std::thread::sleep(Duration::from_millis(10));

        let stats = reaper.run_once();
        assert_eq!(stats.files_removed, 0);
        assert!(dir.path().join("subdir").exists());
    }
}
