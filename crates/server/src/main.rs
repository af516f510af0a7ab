// crates/server/src/main.rs
//! Batch progress server binary.
//!
//! Serves the landing page, the upload trigger and the progress streams
//! until SIGINT or SIGTERM, then ends open streams and drains connections.

use std::sync::Arc;

use anyhow::{Context, Result};
use batch_progress_observability::{init_tracing, LogFormat};
use batch_progress_server::{create_app_full, AppState, Config};
use clap::Parser;

/// Default `RUST_LOG` directives when the variable is unset.
const DEFAULT_LOG_DIRECTIVES: &str = "warn,batch_progress_server=info";

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(DEFAULT_LOG_DIRECTIVES, LogFormat::from_env()?)?;
    config.validate()?;

    let addr = config.socket_addr()?;
    let state = AppState::new(&config);
    let app = create_app_full(Arc::clone(&state), config.static_dir());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        %addr,
        phase_delay_ms = config.phase_delay_ms,
        poll_interval_ms = config.poll_interval_ms,
        "Batch progress server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open event streams would otherwise hold the drain open.
            state.begin_shutdown();
        })
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
