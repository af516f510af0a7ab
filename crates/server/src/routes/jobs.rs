// crates/server/src/routes/jobs.rs
//! API routes for batch upload job records.
//!
//! - GET /jobs — List remembered jobs, newest first
//! - GET /jobs/{id} — Snapshot of one job
//! - GET /jobs/{id}/events — SSE stream of one job's progress

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

use super::events::sse_response;
use crate::error::{ApiError, ApiResult};
use crate::jobs::{phase_frames, JobId, JobProgress};
use crate::state::AppState;

/// GET /api/jobs — List all remembered jobs.
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobProgress>> {
    Json(state.jobs.jobs())
}

/// GET /api/jobs/{id} — Current snapshot of one job.
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<JobProgress>> {
    state
        .jobs
        .get_job(id)
        .map(Json)
        .ok_or(ApiError::JobNotFound(id))
}

/// GET /api/jobs/{id}/events — Progress of one job, unaffected by later jobs.
async fn stream_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> ApiResult<impl IntoResponse> {
    let source = state
        .jobs
        .subscribe_job(id)
        .ok_or(ApiError::JobNotFound(id))?;
    let frames = phase_frames(source, Some(id), state.stream, state.shutdown_signal());
    Ok(sse_response(frames))
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/events", get(stream_job))
}
