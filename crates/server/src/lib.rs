// crates/server/src/lib.rs
//! Stevedore server library.
//!
//! Axum-based HTTP server orchestrating long-running export/import jobs:
//! the in-memory job registry, the SSE progress protocol, the
//! cross-session operation lock, and the stale-resource reaper.

pub mod error;
pub mod jobs;
pub mod lock;
pub mod reaper;
pub mod routes;
pub mod state;

pub use error::*;
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes (health, operations, lock)
/// - CORS for development (allows any origin)
/// - Request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
