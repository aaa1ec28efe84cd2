// crates/server/src/routes/lock.rs
//! Cross-session operation lock endpoints.
//!
//! - `GET    /lock` — current lock state
//! - `POST   /lock` — claim the lock for a job
//! - `DELETE /lock` — release the lock (idempotent)

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::jobs::{JobId, JobKind};
use crate::lock::OperationLock;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/lock", get(get_lock).post(acquire_lock).delete(release_lock))
}

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
#[serde(rename_all = "camelCase")]
pub struct LockStatusResponse {
    pub held: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock: Option<OperationLock>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireLockRequest {
    pub kind: JobKind,
    pub job_id: JobId,
}

/// GET /api/lock — re-reads the backing record so every session polling
/// this endpoint converges on the same view.
async fn get_lock(State(state): State<Arc<AppState>>) -> Json<LockStatusResponse> {
    let lock = state.lock.reload();
    Json(LockStatusResponse {
        held: lock.is_some(),
        lock,
    })
}

/// POST /api/lock — claim the lock. Advisory: always succeeds.
async fn acquire_lock(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AcquireLockRequest>,
) -> ApiResult<Json<OperationLock>> {
    let lock = state.lock.acquire(body.kind, body.job_id)?;
    Ok(Json(lock))
}

/// DELETE /api/lock — release the lock. Releasing an absent lock is a no-op.
async fn release_lock(State(state): State<Arc<AppState>>) -> ApiResult<StatusCode> {
    state.lock.release()?;
    Ok(StatusCode::NO_CONTENT)
}
