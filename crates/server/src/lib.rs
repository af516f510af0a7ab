// crates/server/src/lib.rs
//! Batch progress server library.
//!
//! This crate provides the Axum-based HTTP server that runs simulated batch
//! uploads and streams their progress to browsers over Server-Sent Events.

pub mod config;
pub mod error;
pub mod jobs;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::*;
pub use routes::api_routes;
pub use state::AppState;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use batch_progress_observability::http_trace_layer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - Landing page and API routes
/// - CORS for development (allows any origin)
/// - Request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    create_app_full(state, None)
}

/// Like [`create_app`], additionally serving files from `static_dir` for any
/// path no route matches.
pub fn create_app_full(state: Arc<AppState>, static_dir: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = api_routes(state);
    if let Some(dir) = static_dir {
        tracing::info!(dir = %dir.display(), "Serving static files");
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(ServiceBuilder::new().layer(http_trace_layer()).layer(cors))
}

// ============================================================================
// Integration Tests
// ============================================================================
