//! # Ingestors Main Entry Point
//!
//! Boots the service: configuration, telemetry, database pool and
//! migrations, the background poller, and the admin HTTP server. Ctrl-C
//! cancels the shared shutdown token and both halves drain gracefully.

use std::sync::Arc;

use sea_orm_migration::MigratorTrait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ingestors::config::ConfigLoader;
use ingestors::ingest::SyncOrchestrator;
use ingestors::migration::Migrator;
use ingestors::poller::Poller;
use ingestors::repositories::SourceRepository;
use ingestors::server::{AppState, build_http_client, run_server};
use ingestors::telemetry::init_tracing;

/// Pending manual triggers the sync-now endpoint may queue before 503ing
const SYNC_TRIGGER_BUFFER: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new().load()?;

    init_tracing(&config)?;
    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!(config = %redacted_json, "Effective configuration");
    }

    let db = Arc::new(ingestors::db::init_pool(&config).await?);
    Migrator::up(db.as_ref(), None).await?;
    tracing::info!("Migrations applied");

    let http = build_http_client(&config)?;
    let orchestrator = SyncOrchestrator::new(http, db.clone(), config.poller.clone());

    let (sync_tx, sync_rx) = mpsc::channel(SYNC_TRIGGER_BUFFER);
    let shutdown = CancellationToken::new();

    let poller = Arc::new(Poller::new(
        orchestrator.clone(),
        SourceRepository::new(db.clone()),
        config.poller.clone(),
    ));
    let poller_handle = tokio::spawn(poller.run(sync_rx, shutdown.clone()));

    let state = AppState::new(db, sync_tx, orchestrator);
    let server_shutdown = shutdown.clone();
    let server_handle = tokio::spawn(run_server(config, state, server_shutdown));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    shutdown.cancel();

    poller_handle.await?;
    server_handle.await??;

    Ok(())
}
