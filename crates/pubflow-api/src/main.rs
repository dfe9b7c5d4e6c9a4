//! # pubflow-api binary
//!
//! Starts the notifier, hydrates the controller from Postgres when
//! configured, starts the embargo sweeper, and serves the API until
//! Ctrl-C. Queued effects are drained before exit.

use std::sync::Arc;

use pubflow_api::state::{AppConfig, AppState};
use pubflow_api::sweeper::EmbargoSweeper;
use pubflow_notify::{Collaborators, LoggingCollaborator, Notifier};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("Invalid configuration: {e}");
        e
    })?;
    tracing::info!(?config, "configuration loaded");

    let pool = pubflow_api::db::init_pool(config.database_url.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("Database initialization failed: {e}");
            e
        })?;

    let notifier = Notifier::start(
        Collaborators::uniform(Arc::new(LoggingCollaborator)),
        config.notifier,
    );
    let port = config.port;
    let sweep_period = config.embargo_sweep;
    let state = AppState::with_notifier(config, notifier.handle()).with_pool(pool);

    if let Some(pool) = &state.db_pool {
        let artifacts = pubflow_api::db::artifacts::load_all(pool).await?;
        let loaded = state.controller.hydrate(artifacts);
        tracing::info!(loaded, "artifacts hydrated from database");
    }

    let sweeper = EmbargoSweeper::start(state.clone(), sweep_period);
    let app = pubflow_api::app(state)?;
    let addr = format!("0.0.0.0:{port}");
    tracing::info!("Starting pubflow API server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.stop().await;
    let report = notifier.shutdown().await;
    tracing::info!(
        delivered = report.delivered,
        failed = report.failed,
        rejected = report.rejected,
        "notifier drained"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
