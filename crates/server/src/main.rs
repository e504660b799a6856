use std::time::Duration;

use anyhow::{Context, Result};
use opsgate_core::config::{AppConfig, LoadOptions};
use opsgate_server::{bootstrap_with_config, router};

fn init_logging(config: &AppConfig) {
    use opsgate_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "opsgate-server started"
    );

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router(app.state)).with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
    });
    let mut server_task = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut server_task => joined.context("server task failed")??,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(
                event_name = "system.server.stopping",
                correlation_id = "shutdown",
                grace_secs = app.config.server.graceful_shutdown_secs,
                "opsgate-server stopping"
            );
            let _ = shutdown_tx.send(());

            // Bound connection draining by the configured grace period.
            match tokio::time::timeout(grace, &mut server_task).await {
                Ok(joined) => joined.context("server task failed")??,
                Err(_) => tracing::warn!(
                    event_name = "system.server.drain_timed_out",
                    correlation_id = "shutdown",
                    "open connections did not drain within the grace period"
                ),
            }
        }
    }

    Ok(())
}
