// crates/server/src/routes/upload.rs
//! Batch upload trigger.
//!
//! - POST /upload-batch — Run one batch upload and answer once it completes

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;

use crate::error::ApiResult;
use crate::state::AppState;

/// Response header carrying the id of the job a request started.
pub const JOB_ID_HEADER: &str = "x-job-id";

/// POST /api/upload-batch — Start an upload and wait for `COMPLETED`.
///
/// Answers 200 with an empty body once the upload finishes, or 409 while
/// another upload is still running. The upload keeps going if the client
/// disconnects early.
async fn upload_batch(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let handle = state.jobs.start_upload()?;
    let job_id = handle.id;

    let progress = handle.wait().await?;
    tracing::info!(job_id, status = %progress.status, "Batch upload request finished");

    Ok((StatusCode::OK, [(JOB_ID_HEADER, job_id.to_string())]))
}

/// Build the upload router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/upload-batch", post(upload_batch))
}
