//! reqtrail REST server binary

use std::path::Path;

use anyhow::Context;
use reqtrail::logging::{init_tracing, LoggingConfig};
use reqtrail::shutdown::shutdown_signal;
use reqtrail_server::{bootstrap, create_app};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guards = init_tracing(&LoggingConfig::from_env())
        .context("failed to install the tracing subscriber")?;
    let config = bootstrap::load_config(|key| std::env::var(key).ok(), Path::new("."))?;
    info!("Starting reqtrail server");

    let state = bootstrap::setup(&config).await?;
    let shutdown = state.shutdown.clone();
    let app = create_app(state);

    let port = u16::from(config.port);
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    info!(port, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutting down...");
    let failed = shutdown.run_all().await;
    if failed.is_empty() {
        info!("Shutdown complete");
    } else {
        error!(?failed, "Some shutdown hooks failed");
    }
    Ok(())
}
