// crates/server/src/jobs/stream.rs
//! Push-based progress streaming for one job.
//!
//! Subscribers get a generator that re-reads the registry on a short
//! interval and emits typed events; the HTTP layer maps them onto SSE
//! frames. Both timers live inside the generator, so a disconnecting
//! client drops the poll and heartbeat together — nothing periodic leaks.

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::Stream;

use super::registry::JobRegistry;
use super::types::{Job, JobId, JobStatus, StreamEvent};

/// How often a subscriber re-reads the job.
pub const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// How often an idle stream emits a ping to keep the transport open.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Event stream for one subscriber of job `id`.
///
/// Emits an initial snapshot, then `progress` events on every poll while
/// the job is non-terminal and `ping` heartbeats in between. Exactly one
/// terminal `finished`/`error` event is emitted before the stream ends; a
/// job that vanishes mid-stream (reaped) ends it with an `error` event.
///
/// Subscribers are read-only observers; any number may watch the same job.
pub fn progress_events(
    registry: Arc<JobRegistry>,
    id: JobId,
    poll: Duration,
    heartbeat: Duration,
) -> impl Stream<Item = StreamEvent> {
    async_stream::stream! {
        // Initial snapshot. The route checks existence before subscribing,
        // so None here means the job was reaped in between.
        match registry.get(id) {
            None => {
                yield StreamEvent::error("Job not found");
                return;
            }
            Some(job) if job.status.is_terminal() => {
                yield terminal_event(&job);
                return;
            }
            Some(job) => yield StreamEvent::progress(&job),
        }

        let start = tokio::time::Instant::now();
        let mut poll_ticks = tokio::time::interval_at(start + poll, poll);
        let mut heartbeat_ticks = tokio::time::interval_at(start + heartbeat, heartbeat);

        loop {
            tokio::select! {
                _ = poll_ticks.tick() => {
                    match registry.get(id) {
                        None => {
                            tracing::warn!(job_id = %id, "Job disappeared mid-stream");
                            yield StreamEvent::error("Job not found");
                            break;
                        }
                        Some(job) if job.status.is_terminal() => {
                            yield terminal_event(&job);
                            break;
                        }
                        Some(job) => yield StreamEvent::progress(&job),
                    }
                }
                _ = heartbeat_ticks.tick() => {
                    yield StreamEvent::ping();
                }
            }
        }
    }
}

fn terminal_event(job: &Job) -> StreamEvent {
    match job.status {
        JobStatus::Completed => {
            StreamEvent::finished(job.result.clone().unwrap_or(serde_json::Value::Null))
        }
        _ => StreamEvent::error(
            job.error
                .clone()
                .unwrap_or_else(|| "Operation failed".to_string()),
        ),
    }
}
