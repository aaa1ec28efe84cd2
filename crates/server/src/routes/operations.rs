// crates/server/src/routes/operations.rs
//! API routes for bulk export/import operations.
//!
//! - `POST /operations`                  — start an operation, returns `{ jobId }`
//! - `GET  /operations`                  — list active jobs
//! - `GET  /operations/{id}`             — JSON snapshot of one job (polling fallback)
//! - `GET  /operations/{id}/stream`      — SSE stream of job progress
//! - `GET  /operations/{id}/download`    — download a completed export's artifact

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_util::io::ReaderStream;

use stevedore_core::{
    download_file_name, temp_artifact_path, DataSet, ExportOptions, ImportOptions,
    ENCRYPTED_TARBALL_EXT,
};

use crate::error::{ApiError, ApiResult};
use crate::jobs::{
    progress_events, ArchiveRequest, Job, JobId, JobKind, JobStatus, HEARTBEAT_INTERVAL,
    PROGRESS_POLL_INTERVAL,
};
use crate::state::AppState;

/// Build the operations router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/operations", post(create_operation).get(list_operations))
        .route("/operations/{id}", get(get_operation))
        .route("/operations/{id}/stream", get(stream_operation))
        .route("/operations/{id}/download", get(download_operation))
}

/// Body of `POST /operations`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOperationRequest {
    pub kind: JobKind,
    #[serde(default)]
    pub include_files: bool,
    #[serde(default)]
    pub skip_assets: bool,
    #[serde(default)]
    pub exclude: Vec<DataSet>,
    #[serde(default)]
    pub only: Vec<DataSet>,
    /// Import only: server-local path of the staged archive.
    pub archive_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct CreateOperationResponse {
    pub job_id: JobId,
}

/// POST /api/operations — create a job and start it asynchronously.
///
/// Validation failures are reported here and no job is ever created for
/// them. On success the job id comes back immediately (202) while the
/// operation runs in the background.
async fn create_operation(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateOperationRequest>,
) -> ApiResult<(StatusCode, Json<CreateOperationResponse>)> {
    let request = match body.kind {
        JobKind::Export => ArchiveRequest::Export {
            base_path: temp_artifact_path(&state.config.temp_dir, "export-"),
            options: ExportOptions {
                include_files: body.include_files,
            },
        },
        JobKind::Import => {
            if !state.config.enable_import {
                return Err(ApiError::ImportDisabled);
            }
            let archive_path = body
                .archive_path
                .clone()
                .ok_or_else(|| ApiError::BadRequest("Missing uploaded archive file".to_string()))?;
            let meta = tokio::fs::metadata(&archive_path).await.map_err(|_| {
                ApiError::BadRequest(format!(
                    "Archive file not found: {}",
                    archive_path.display()
                ))
            })?;
            if meta.len() > state.config.max_file_size {
                return Err(ApiError::PayloadTooLarge {
                    size: meta.len(),
                    max: state.config.max_file_size,
                });
            }
            ArchiveRequest::Import {
                archive_path,
                options: ImportOptions {
                    skip_assets: body.skip_assets,
                    include_files: body.include_files,
                    exclude: body.exclude.clone(),
                    only: body.only.clone(),
                },
            }
        }
    };

    // Echoed back on job snapshots for diagnostics only.
    let params = serde_json::json!({
        "includeFiles": body.include_files,
        "skipAssets": body.skip_assets,
        "exclude": body.exclude,
        "only": body.only,
        "archivePath": body.archive_path,
    });

    let job_id = state.registry.create(body.kind, params);
    state.runner.spawn(job_id, request);

    Ok((StatusCode::ACCEPTED, Json(CreateOperationResponse { job_id })))
}

/// GET /api/operations — list all active (non-terminal) jobs.
async fn list_operations(State(state): State<Arc<AppState>>) -> Json<Vec<Job>> {
    Json(state.registry.active())
}

/// GET /api/operations/{id} — JSON snapshot of one job.
async fn get_operation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<Job>> {
    state
        .registry
        .get(id)
        .map(Json)
        .ok_or(ApiError::JobNotFound(id))
}

/// GET /api/operations/{id}/stream — SSE stream of job progress.
///
/// Each frame is `data: <JSON>` where the JSON carries a `type` of
/// `progress`, `finished`, `error`, or `ping`. Exactly one terminal frame
/// is sent before the stream closes. Unknown ids get a 404 before any
/// channel is opened.
async fn stream_operation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> ApiResult<impl IntoResponse> {
    if state.registry.get(id).is_none() {
        return Err(ApiError::JobNotFound(id));
    }

    let events = progress_events(
        Arc::clone(&state.registry),
        id,
        PROGRESS_POLL_INTERVAL,
        HEARTBEAT_INTERVAL,
    )
    .map(|event| {
        Ok::<_, Infallible>(
            Event::default().data(serde_json::to_string(&event).unwrap_or_default()),
        )
    });

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(events),
    ))
}

/// GET /api/operations/{id}/download — stream a completed export artifact.
async fn download_operation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> ApiResult<impl IntoResponse> {
    let job = state.registry.get(id).ok_or(ApiError::JobNotFound(id))?;
    if job.kind != JobKind::Export {
        return Err(ApiError::BadRequest(
            "Only export jobs produce a downloadable artifact".to_string(),
        ));
    }
    if job.status != JobStatus::Completed {
        return Err(ApiError::Conflict(format!(
            "Job is not completed (status: {:?})",
            job.status
        )));
    }

    let result = job.result.unwrap_or_default();
    let path = result["path"]
        .as_str()
        .map(PathBuf::from)
        .ok_or_else(|| ApiError::Internal("Completed export has no artifact path".to_string()))?;
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::ArtifactMissing(path.clone()))?;

    // Clients see a dated name instead of the opaque temp-file one.
    let encrypted = path.to_string_lossy().ends_with(ENCRYPTED_TARBALL_EXT);
    let file_name = download_file_name("stevedore", job.created_at, encrypted);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/tar+gzip"),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("content-disposition"),
    );

    Ok((headers, Body::from_stream(ReaderStream::new(file))))
}
