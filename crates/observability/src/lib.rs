//! Logging setup shared by the batch-progress binaries.
//!
//! - [`init_tracing`] installs the global `tracing` subscriber
//! - [`http_trace_layer`] builds the request-tracing middleware for axum

use std::str::FromStr;

use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable selecting the log output format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected 'compact' or 'json')")),
        }
    }
}

impl LogFormat {
    /// Read the format from `LOG_FORMAT`. Unset means compact output; an
    /// unrecognised value is an error.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_env_value(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }

    fn from_env_value(value: Option<&str>) -> anyhow::Result<Self> {
        match value {
            None => Ok(Self::default()),
            Some(v) => v
                .parse()
                .map_err(|e: String| anyhow::anyhow!("invalid {LOG_FORMAT_ENV}: {e}")),
        }
    }
}

/// Build the filter from `RUST_LOG`, or `default_directives` when unset.
pub fn env_filter(default_directives: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives))
}

/// Install the global subscriber.
///
/// Fails if a global subscriber has already been set.
pub fn init_tracing(default_directives: &str, format: LogFormat) -> anyhow::Result<()> {
    let filter = env_filter(default_directives);
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact().with_target(true))
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false),
            )
            .try_init()?,
    }

    Ok(())
}

/// Request tracing middleware: one INFO span per request, INFO on response.
pub fn http_trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO))
}
