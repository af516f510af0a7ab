// crates/server/src/routes/events.rs
//! Progress event stream.
//!
//! - GET /events — SSE stream of the shared upload progress

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio_stream::{Stream, StreamExt};

use crate::jobs::{frame_payload, phase_frames, Phase};
use crate::state::AppState;

/// Wrap a frame stream into an SSE response.
///
/// Each frame becomes one `data: <phase>` event. Axum sets
/// `Content-Type: text/event-stream` and `Cache-Control: no-cache`.
pub(crate) fn sse_response<S>(frames: S) -> impl IntoResponse
where
    S: Stream<Item = Option<Phase>> + Send + 'static,
{
    let events = frames.map(|frame| Ok::<_, Infallible>(Event::default().data(frame_payload(frame))));
    ([(header::CONNECTION, "keep-alive")], Sse::new(events))
}

/// GET /api/events — stream the shared progress slot until `COMPLETED`.
async fn stream_events(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let frames = phase_frames(
        state.jobs.latest().subscribe(),
        None,
        state.stream,
        state.shutdown_signal(),
    );
    sse_response(frames)
}

/// Build the events router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/events", get(stream_events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app(state: Arc<AppState>) -> Router {
        Router::new().nest("/api", router()).with_state(state)
    }

    #[test]
    fn test_router_creation() {
        let _router = router();
    }

    #[tokio::test]
    async fn test_events_after_completed_job_closes_immediately() {
        let state = AppState::new(&Config::default());
        state.jobs.latest().publish(1, Phase::Completed);

        let response = app(state)
            .oneshot(Request::builder().uri("/api/events").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert!(headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .contains("text/event-stream"));
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::CONNECTION], "keep-alive");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(body.to_vec()).unwrap(), "data: COMPLETED\n\n");
    }

    #[tokio::test]
    async fn test_shutdown_closes_idle_stream() {
        let state = AppState::new(&Config::default());
        state.begin_shutdown();

        let response = app(state)
            .oneshot(Request::builder().uri("/api/events").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
    }
}
