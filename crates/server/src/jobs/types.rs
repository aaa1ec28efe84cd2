// crates/server/src/jobs/types.rs
//! Types for the bulk-operation job system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a job, allocated once at creation.
pub type JobId = Uuid;

/// Which bulk operation a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Export,
    Import,
}

/// Job lifecycle state.
///
/// `pending -> running -> {completed, error}`. There is no cancelled state:
/// the archiver call cannot be aborted once started, so neither can a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl JobStatus {
    /// Completed and error are terminal; a terminal job never mutates again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

/// One export or import attempt.
///
/// Owned exclusively by the registry; everything outside works with cloned
/// snapshots.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    /// 0–100. Non-decreasing once the job leaves pending; a regression is
    /// logged as a bug indicator but the latest write still wins.
    pub progress: u8,
    pub message: String,
    /// Request options, echoed back for diagnostics. The registry never
    /// interprets these.
    pub params: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub(crate) fn new(id: JobId, kind: JobKind, params: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind,
            status: JobStatus::Pending,
            progress: 0,
            message: String::new(),
            params,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One event on a job's SSE stream.
///
/// Serialized as `{"type": "progress" | "finished" | "error" | "ping", ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Progress {
        status: JobStatus,
        progress: u8,
        message: String,
        timestamp: DateTime<Utc>,
    },
    Finished {
        result: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    Error {
        error: String,
        timestamp: DateTime<Utc>,
    },
    Ping {
        timestamp: DateTime<Utc>,
    },
}

impl StreamEvent {
    pub fn progress(job: &Job) -> Self {
        Self::Progress {
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn finished(result: serde_json::Value) -> Self {
        Self::Finished {
            result,
            timestamp: Utc::now(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn ping() -> Self {
        Self::Ping {
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Error.is_terminal());
    }

    #[test]
    fn test_job_serializes_camel_case() {
        let job = Job::new(Uuid::new_v4(), JobKind::Export, serde_json::json!({}));
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"kind\":\"export\""));
        assert!(json.contains("\"status\":\"pending\""));
        assert!(json.contains("\"createdAt\""));
        // Absent result/error are omitted entirely
        assert!(!json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_stream_event_tagging() {
        let event = StreamEvent::finished(serde_json::json!({"fileName": "a.tar.gz"}));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "finished");
        assert_eq!(json["result"]["fileName"], "a.tar.gz");

        let event = StreamEvent::ping();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ping");
        assert!(json["timestamp"].is_string());

        let event = StreamEvent::error("Export failed");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"], "Export failed");
    }
}
