// crates/server/src/routes/mod.rs
//! Route handlers for the batch progress server.

pub mod events;
pub mod health;
pub mod index;
pub mod jobs;
pub mod upload;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined router: the landing page plus the API under /api.
///
/// Routes:
/// - GET  / - Landing page
/// - GET  /api/health - Health check
/// - POST /api/upload-batch - Run one batch upload, answer on completion
/// - GET  /api/events - SSE stream of the shared upload progress
/// - GET  /api/jobs - Remembered jobs, newest first
/// - GET  /api/jobs/{id} - Snapshot of one job
/// - GET  /api/jobs/{id}/events - SSE stream of one job's progress
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(index::router())
        .nest("/api", health::router())
        .nest("/api", upload::router())
        .nest("/api", events::router())
        .nest("/api", jobs::router())
        .with_state(state)
}
