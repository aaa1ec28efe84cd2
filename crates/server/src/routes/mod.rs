//! API route handlers for the stevedore server.

pub mod health;
pub mod lock;
pub mod operations;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET    /api/health                    - Health check
/// - POST   /api/operations                - Start an export/import job
/// - GET    /api/operations                - List active jobs
/// - GET    /api/operations/:id            - Job snapshot
/// - GET    /api/operations/:id/stream     - SSE stream of job progress
/// - GET    /api/operations/:id/download   - Download a completed export
/// - GET    /api/lock                      - Current operation lock
/// - POST   /api/lock                      - Acquire the operation lock
/// - DELETE /api/lock                      - Release the operation lock
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", operations::router())
        .nest("/api", lock::router())
        .with_state(state)
}
