// crates/server/src/config.rs
//! Server configuration from command-line flags and environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::jobs::StreamSettings;

/// Default port for the server.
pub const DEFAULT_PORT: u16 = 3000;
/// Default pause between two upload phases.
pub const DEFAULT_PHASE_DELAY_MS: u64 = 500;
/// Default cadence of the event streams.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
/// Default cap on one event stream's lifetime.
pub const DEFAULT_MAX_STREAM_SECS: u64 = 600;
/// Default number of job records kept in memory.
pub const DEFAULT_JOB_HISTORY: usize = 32;

/// Batch upload progress server.
///
/// | Env Var            | Default     |
/// |--------------------|-------------|
/// | `HOST`             | `127.0.0.1` |
/// | `PORT`             | `3000`      |
/// | `PHASE_DELAY_MS`   | `500`       |
/// | `POLL_INTERVAL_MS` | `200`       |
/// | `MAX_STREAM_SECS`  | `600`       |
/// | `JOB_HISTORY`      | `32`        |
/// | `STATIC_DIR`       | `static`    |
#[derive(Debug, Clone, Parser)]
#[command(name = "batch-progress", version, about)]
pub struct Config {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1", env = "HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT, env = "PORT")]
    pub port: u16,

    /// Pause between upload phases, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_PHASE_DELAY_MS, env = "PHASE_DELAY_MS")]
    pub phase_delay_ms: u64,

    /// Event stream cadence, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS, env = "POLL_INTERVAL_MS")]
    pub poll_interval_ms: u64,

    /// Maximum lifetime of one event stream, in seconds. 0 disables the limit.
    #[arg(long, default_value_t = DEFAULT_MAX_STREAM_SECS, env = "MAX_STREAM_SECS")]
    pub max_stream_secs: u64,

    /// Number of finished job records to keep.
    #[arg(long, default_value_t = DEFAULT_JOB_HISTORY, env = "JOB_HISTORY")]
    pub job_history: usize,

    /// Directory of static assets served at the root.
    #[arg(long, default_value = "static", env = "STATIC_DIR")]
    pub static_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            phase_delay_ms: DEFAULT_PHASE_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_stream_secs: DEFAULT_MAX_STREAM_SECS,
            job_history: DEFAULT_JOB_HISTORY,
            static_dir: PathBuf::from("static"),
        }
    }
}

impl Config {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll interval must be greater than zero");
        }
        if self.job_history == 0 {
            anyhow::bail!("job history must keep at least one record");
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|e| anyhow::anyhow!("invalid bind address '{addr}': {e}"))
    }

    pub fn phase_delay(&self) -> Duration {
        Duration::from_millis(self.phase_delay_ms)
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_duration: (self.max_stream_secs > 0)
                .then(|| Duration::from_secs(self.max_stream_secs)),
        }
    }

    /// The static directory, if it exists on disk.
    pub fn static_dir(&self) -> Option<PathBuf> {
        self.static_dir.is_dir().then(|| self.static_dir.clone())
    }
}
