// crates/server/src/jobs/mod.rs
//! Asynchronous job orchestration for bulk export/import operations.
//!
//! Provides:
//! - `JobRegistry` — authoritative in-memory job state
//! - `JobRunner` — background task driving one job via the archiver
//! - `progress_events` — per-subscriber progress stream
//! - `ActiveArtifacts` — paths owned by running jobs (reaper guard)

pub mod registry;
pub mod runner;
pub mod stream;
pub mod types;

pub use registry::JobRegistry;
pub use runner::{ActiveArtifacts, ArchiveRequest, JobRunner};
pub use stream::{progress_events, HEARTBEAT_INTERVAL, PROGRESS_POLL_INTERVAL};
pub use types::{Job, JobId, JobKind, JobStatus, StreamEvent};
