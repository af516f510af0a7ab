// crates/server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use crate::config::Config;
use crate::jobs::{JobRunner, StreamSettings};

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Upload runner; owns the shared progress slot.
    pub jobs: Arc<JobRunner>,
    /// Cadence and lifetime of the event streams.
    pub stream: StreamSettings,
    /// Flips to `true` once the server starts shutting down; open event
    /// streams end when they see it.
    shutdown: watch::Sender<bool>,
}

impl AppState {
    /// Create a new application state wrapped in an Arc for sharing.
    pub fn new(config: &Config) -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            jobs: Arc::new(JobRunner::new(config.phase_delay(), config.job_history)),
            stream: config.stream_settings(),
            shutdown: watch::channel(false).0,
        })
    }

    /// Get the server uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Receiver that event streams watch for shutdown.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Ask every open event stream to end.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}
