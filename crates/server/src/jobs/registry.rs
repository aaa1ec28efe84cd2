// crates/server/src/jobs/registry.rs
//! The authoritative, in-memory store of every job.
//!
//! The registry is the single serialization point for job state: runner,
//! stream subscribers, and the reaper all go through this narrow API, so
//! concurrent readers never observe a torn record. Job state is
//! intentionally ephemeral — nothing survives a process restart.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use super::types::{Job, JobId, JobKind, JobStatus};

pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate a new pending job and return its identifier.
    pub fn create(&self, kind: JobKind, params: serde_json::Value) -> JobId {
        let id = Uuid::new_v4();
        let job = Job::new(id, kind, params);
        match self.jobs.write() {
            Ok(mut jobs) => {
                jobs.insert(id, job);
                tracing::info!(job_id = %id, kind = ?kind, total = jobs.len(), "Created job");
            }
            Err(e) => tracing::error!("RwLock poisoned writing jobs map: {e}"),
        }
        id
    }

    /// Snapshot of a single job, or `None` if unknown or already reaped.
    pub fn get(&self, id: JobId) -> Option<Job> {
        match self.jobs.read() {
            Ok(jobs) => jobs.get(&id).cloned(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs map: {e}");
                None
            }
        }
    }

    /// All non-terminal jobs.
    pub fn active(&self) -> Vec<Job> {
        match self.jobs.read() {
            Ok(jobs) => jobs
                .values()
                .filter(|j| !j.status.is_terminal())
                .cloned()
                .collect(),
            Err(e) => {
                tracing::error!("RwLock poisoned reading jobs map: {e}");
                Vec::new()
            }
        }
    }

    /// Record a progress update. The first update moves a pending job to
    /// running. Unknown and terminal jobs are logged and left untouched.
    pub fn set_progress(&self, id: JobId, progress: u8, message: impl Into<String>) {
        let progress = progress.min(100);
        self.mutate(id, "set_progress", |job| {
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Running;
            }
            if progress < job.progress {
                tracing::warn!(
                    job_id = %id,
                    from = job.progress,
                    to = progress,
                    "Progress moved backwards"
                );
            }
            job.progress = progress;
            job.message = message.into();
        });
    }

    /// Terminal success. Later mutation calls on this id are ignored.
    pub fn set_completed(&self, id: JobId, result: serde_json::Value) {
        self.mutate(id, "set_completed", |job| {
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.message = "Completed successfully".to_string();
            job.result = Some(result);
        });
    }

    /// Terminal failure. Later mutation calls on this id are ignored.
    pub fn set_error(&self, id: JobId, error: impl Into<String>) {
        let error = error.into();
        self.mutate(id, "set_error", |job| {
            job.status = JobStatus::Error;
            job.message = format!("Error: {error}");
            job.error = Some(error);
        });
    }

    /// Remove every job whose last update is older than `max_age`.
    /// Returns how many were removed.
    pub fn sweep(&self, max_age: Duration) -> usize {
        // An age too large to represent means nothing can be that old.
        let cutoff = match chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        {
            Some(cutoff) => cutoff,
            None => return 0,
        };
        match self.jobs.write() {
            Ok(mut jobs) => {
                let before = jobs.len();
                jobs.retain(|_, job| job.updated_at >= cutoff);
                let removed = before - jobs.len();
                if removed > 0 {
                    tracing::info!(removed, remaining = jobs.len(), "Swept expired jobs");
                }
                removed
            }
            Err(e) => {
                tracing::error!("RwLock poisoned sweeping jobs map: {e}");
                0
            }
        }
    }

    fn mutate(&self, id: JobId, op: &'static str, f: impl FnOnce(&mut Job)) {
        match self.jobs.write() {
            Ok(mut jobs) => match jobs.get_mut(&id) {
                Some(job) if job.status.is_terminal() => {
                    tracing::warn!(job_id = %id, op, status = ?job.status, "Ignoring mutation of terminal job");
                }
                Some(job) => {
                    f(job);
                    job.updated_at = Utc::now();
                }
                None => {
                    tracing::warn!(job_id = %id, op, "Ignoring mutation of unknown job");
                }
            },
            Err(e) => tracing::error!("RwLock poisoned writing jobs map: {e}"),
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_starts_pending_at_zero() {
        let registry = JobRegistry::new();
        let id = registry.create(JobKind::Export, json!({"includeFiles": true}));

        let job = registry.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.params["includeFiles"], true);
        assert!(job.result.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_get_unknown_is_none() {
        let registry = JobRegistry::new();
        assert!(registry.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_first_progress_moves_to_running() {
        let registry = JobRegistry::new();
        let id = registry.create(JobKind::Export, json!({}));

        registry.set_progress(id, 30, "Starting export");
        let job = registry.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.progress, 30);
        assert_eq!(job.message, "Starting export");

        // Latest write wins
        registry.set_progress(id, 60, "Halfway");
        let job = registry.get(id).unwrap();
        assert_eq!(job.progress, 60);
        assert_eq!(job.message, "Halfway");
    }

    #[test]
    fn test_progress_clamped_to_100() {
        let registry = JobRegistry::new();
        let id = registry.create(JobKind::Import, json!({}));
        registry.set_progress(id, 250, "overshoot");
        assert_eq!(registry.get(id).unwrap().progress, 100);
    }

    #[test]
    fn test_progress_on_unknown_job_is_noop() {
        let registry = JobRegistry::new();
        registry.set_progress(Uuid::new_v4(), 10, "ghost");
        assert!(registry.active().is_empty());
    }

    #[test]
    fn test_completed_is_terminal() {
        let registry = JobRegistry::new();
        let id = registry.create(JobKind::Export, json!({}));
        registry.set_progress(id, 40, "working");
        registry.set_completed(id, json!({"fileName": "export-2024.tar.gz"}));

        let job = registry.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.result.as_ref().unwrap()["fileName"], "export-2024.tar.gz");

        // A terminal job must not reopen
        registry.set_progress(id, 10, "late update");
        registry.set_error(id, "late failure");
        let job = registry.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.error.is_none());
        assert_eq!(job.result.as_ref().unwrap()["fileName"], "export-2024.tar.gz");
    }

    #[test]
    fn test_error_is_terminal() {
        let registry = JobRegistry::new();
        let id = registry.create(JobKind::Import, json!({}));
        registry.set_error(id, "Archiver exited with 1");

        let job = registry.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("Archiver exited with 1"));
        assert_eq!(job.message, "Error: Archiver exited with 1");

        registry.set_completed(id, json!({}));
        assert_eq!(registry.get(id).unwrap().status, JobStatus::Error);
    }

    #[test]
    fn test_active_excludes_terminal() {
        let registry = JobRegistry::new();
        let running = registry.create(JobKind::Export, json!({}));
        registry.set_progress(running, 10, "working");
        let done = registry.create(JobKind::Export, json!({}));
        registry.set_completed(done, json!({}));

        let active = registry.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, running);
    }

    #[test]
    fn test_sweep_by_age() {
        let registry = JobRegistry::new();
        let old = registry.create(JobKind::Export, json!({}));
        registry.set_completed(old, json!({}));

        std::thread::sleep(Duration::from_millis(20));
        let fresh = registry.create(JobKind::Export, json!({}));

        // Everything updated more than 10ms ago goes; the fresh job stays.
        let removed = registry.sweep(Duration::from_millis(10));
        assert_eq!(removed, 1);
        assert!(registry.get(old).is_none());
        assert!(registry.get(fresh).is_some());

        // Sweeping is idempotent
        assert_eq!(registry.sweep(Duration::from_secs(3600)), 0);
    }
}
