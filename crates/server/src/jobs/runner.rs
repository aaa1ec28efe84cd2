// crates/server/src/jobs/runner.rs
//! Drives one job from creation to its terminal state.
//!
//! The runner is the only writer of a job's lifecycle after creation. It
//! never touches transport objects; subscribers observe everything through
//! the registry.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use stevedore_core::{with_archive_ext, Archiver, ExportOptions, ImportOptions};

use super::registry::JobRegistry;
use super::types::JobId;

/// What the runner should ask the archiver to do.
#[derive(Debug, Clone)]
pub enum ArchiveRequest {
    Export {
        /// Base path the archiver appends the archive extension to.
        base_path: PathBuf,
        options: ExportOptions,
    },
    Import {
        archive_path: PathBuf,
        options: ImportOptions,
    },
}

/// Paths currently owned by a running job.
///
/// The reaper consults this set so a long-running export's half-written
/// artifact is never swept out from under it.
pub struct ActiveArtifacts {
    paths: RwLock<HashSet<PathBuf>>,
}

impl ActiveArtifacts {
    pub fn new() -> Self {
        Self {
            paths: RwLock::new(HashSet::new()),
        }
    }

    pub fn contains(&self, path: &std::path::Path) -> bool {
        match self.paths.read() {
            Ok(paths) => paths.contains(path),
            Err(e) => {
                tracing::error!("RwLock poisoned reading active artifacts: {e}");
                // Err on the side of treating everything as active.
                true
            }
        }
    }

    pub(crate) fn insert_all(&self, paths: &[PathBuf]) {
        match self.paths.write() {
            Ok(mut set) => set.extend(paths.iter().cloned()),
            Err(e) => tracing::error!("RwLock poisoned writing active artifacts: {e}"),
        }
    }

    pub(crate) fn remove_all(&self, paths: &[PathBuf]) {
        match self.paths.write() {
            Ok(mut set) => {
                for path in paths {
                    set.remove(path);
                }
            }
            Err(e) => tracing::error!("RwLock poisoned writing active artifacts: {e}"),
        }
    }
}

impl Default for ActiveArtifacts {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns and executes jobs. Exactly one runner task exists per job;
/// `JobRegistry::create` hands out a fresh id per request, so no job is
/// ever driven twice.
pub struct JobRunner {
    registry: Arc<JobRegistry>,
    archiver: Arc<dyn Archiver>,
    artifacts: Arc<ActiveArtifacts>,
}

impl JobRunner {
    pub fn new(
        registry: Arc<JobRegistry>,
        archiver: Arc<dyn Archiver>,
        artifacts: Arc<ActiveArtifacts>,
    ) -> Self {
        Self {
            registry,
            archiver,
            artifacts,
        }
    }

    /// Run `request` as job `id` on a background task. Returns immediately.
    pub fn spawn(&self, id: JobId, request: ArchiveRequest) {
        let registry = Arc::clone(&self.registry);
        let archiver = Arc::clone(&self.archiver);
        let artifacts = Arc::clone(&self.artifacts);
        tokio::spawn(async move {
            run_job(registry, archiver, artifacts, id, request).await;
        });
    }
}

async fn run_job(
    registry: Arc<JobRegistry>,
    archiver: Arc<dyn Archiver>,
    artifacts: Arc<ActiveArtifacts>,
    id: JobId,
    request: ArchiveRequest,
) {
    let guarded = guard_paths(&request);
    artifacts.insert_all(&guarded);

    let outcome = match request {
        ArchiveRequest::Export { base_path, options } => {
            registry.set_progress(id, 5, "Preparing export");
            registry.set_progress(id, 25, "Running export");
            archiver
                .export(&base_path, &options)
                .await
                .map(|outcome| {
                    let size = std::fs::metadata(&outcome.artifact).map(|m| m.len()).ok();
                    serde_json::json!({
                        "fileName": file_name(&outcome.artifact),
                        "path": outcome.artifact,
                        "size": size,
                    })
                })
        }
        ArchiveRequest::Import {
            archive_path,
            options,
        } => {
            registry.set_progress(id, 5, "Preparing import");
            registry.set_progress(id, 25, "Running import");
            archiver
                .import(&archive_path, &options)
                .await
                .map(|outcome| {
                    serde_json::json!({
                        "fileName": file_name(&outcome.artifact),
                    })
                })
        }
    };

    match outcome {
        Ok(result) => {
            tracing::info!(job_id = %id, "Job completed");
            registry.set_completed(id, result);
        }
        Err(e) => {
            tracing::error!(job_id = %id, error = %e, "Job failed");
            registry.set_error(id, e.to_string());
        }
    }

    artifacts.remove_all(&guarded);
}

/// Paths a job owns while running. For exports the final extension depends
/// on whether the archiver encrypts, so both candidates are guarded.
fn guard_paths(request: &ArchiveRequest) -> Vec<PathBuf> {
    match request {
        ArchiveRequest::Export { base_path, .. } => vec![
            base_path.clone(),
            with_archive_ext(base_path, false),
            with_archive_ext(base_path, true),
        ],
        ArchiveRequest::Import { archive_path, .. } => vec![archive_path.clone()],
    }
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::{JobKind, JobStatus};
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;
    use stevedore_core::{ArchiveOutcome, ArchiverError};

    /// Archiver stub with a configurable outcome and delay.
    struct StubArchiver {
        fail: bool,
        delay: Duration,
    }

    #[async_trait]
    impl Archiver for StubArchiver {
        async fn export(
            &self,
            base_path: &Path,
            _options: &ExportOptions,
        ) -> Result<ArchiveOutcome, ArchiverError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(ArchiverError::Failed {
                    status: "exit status: 1".to_string(),
                    stderr: "export blew up".to_string(),
                });
            }
            let artifact = with_archive_ext(base_path, false);
            std::fs::write(&artifact, b"tarball").unwrap();
            Ok(ArchiveOutcome {
                artifact,
                stdout: String::new(),
                stderr: String::new(),
            })
        }

        async fn import(
            &self,
            archive_path: &Path,
            _options: &ImportOptions,
        ) -> Result<ArchiveOutcome, ArchiverError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(ArchiverError::Timeout {
                    timeout: Duration::from_secs(1800),
                });
            }
            Ok(ArchiveOutcome {
                artifact: archive_path.to_path_buf(),
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn runner(fail: bool, delay: Duration) -> (Arc<JobRegistry>, Arc<ActiveArtifacts>, JobRunner) {
        let registry = Arc::new(JobRegistry::new());
        let artifacts = Arc::new(ActiveArtifacts::new());
        let runner = JobRunner::new(
            Arc::clone(&registry),
            Arc::new(StubArchiver { fail, delay }),
            Arc::clone(&artifacts),
        );
        (registry, artifacts, runner)
    }

    async fn wait_terminal(registry: &JobRegistry, id: JobId) -> JobStatus {
        for _ in 0..100 {
            if let Some(job) = registry.get(id) {
                if job.status.is_terminal() {
                    return job.status;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never reached a terminal state");
    }

    #[tokio::test]
    async fn test_export_completes_with_result() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _, runner) = runner(false, Duration::from_millis(10));

        let id = registry.create(JobKind::Export, serde_json::json!({}));
        runner.spawn(
            id,
            ArchiveRequest::Export {
                base_path: dir.path().join("export-1"),
                options: ExportOptions::default(),
            },
        );

        assert_eq!(wait_terminal(&registry, id).await, JobStatus::Completed);
        let job = registry.get(id).unwrap();
        assert_eq!(job.progress, 100);
        let result = job.result.unwrap();
        assert_eq!(result["fileName"], "export-1.tar.gz");
        assert_eq!(result["size"], 7);
    }

    #[tokio::test]
    async fn test_failure_sets_error() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _, runner) = runner(true, Duration::from_millis(10));

        let id = registry.create(JobKind::Export, serde_json::json!({}));
        runner.spawn(
            id,
            ArchiveRequest::Export {
                base_path: dir.path().join("export-2"),
                options: ExportOptions::default(),
            },
        );

        assert_eq!(wait_terminal(&registry, id).await, JobStatus::Error);
        let job = registry.get(id).unwrap();
        assert!(job.error.unwrap().contains("export blew up"));
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn test_artifact_guard_held_during_run() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, artifacts, runner) = runner(false, Duration::from_millis(100));
        let base = dir.path().join("export-3");

        let id = registry.create(JobKind::Export, serde_json::json!({}));
        runner.spawn(
            id,
            ArchiveRequest::Export {
                base_path: base.clone(),
                options: ExportOptions::default(),
            },
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(artifacts.contains(&with_archive_ext(&base, false)));

        wait_terminal(&registry, id).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!artifacts.contains(&with_archive_ext(&base, false)));
    }

    #[tokio::test]
    async fn test_import_completes() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("restore.tar.gz");
        std::fs::write(&archive, b"tarball").unwrap();
        let (registry, _, runner) = runner(false, Duration::from_millis(10));

        let id = registry.create(JobKind::Import, serde_json::json!({}));
        runner.spawn(
            id,
            ArchiveRequest::Import {
                archive_path: archive,
                options: ImportOptions::default(),
            },
        );

        assert_eq!(wait_terminal(&registry, id).await, JobStatus::Completed);
        let job = registry.get(id).unwrap();
        assert_eq!(job.result.unwrap()["fileName"], "restore.tar.gz");
    }
}
