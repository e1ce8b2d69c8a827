//! Paysync sync job - copies new source transactions into the fact table.
//!
//! This is the main entry point for the sync process.

use std::sync::Arc;

use paysync_store::{PgEndpoint, PgStore};
use paysync_sync::{
    init_tracing, retry_unavailable, shutdown, Backoff, SyncConfig, SyncEngine, SyncError,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    tracing::info!("Starting Paysync sync job");

    // Load configuration from environment
    let config = SyncConfig::from_env();
    tracing::info!(?config, "Sync configuration loaded");

    let source_endpoint = PgEndpoint::parse("source", &config.source_url)?
        .with_connect_timeout(config.pool.acquire_timeout);
    let dest_endpoint = PgEndpoint::parse("destination", &config.destination_url)?
        .with_connect_timeout(config.pool.acquire_timeout);

    // Pools connect on first use; the gate below waits for the databases.
    let source = Arc::new(PgStore::connect_lazy(&source_endpoint, &config.pool));
    let destination = Arc::new(PgStore::connect_lazy(&dest_endpoint, &config.pool));

    let (trigger, mut stop) = shutdown::channel();
    tokio::spawn(shutdown::stop_on_signal(trigger));

    let engine = SyncEngine::new(source.clone(), destination.clone(), config);

    match engine
        .await_endpoints(&source_endpoint, &dest_endpoint, &mut stop)
        .await
    {
        Ok(()) => {}
        Err(SyncError::Cancelled) => {
            tracing::info!("Stopped before the databases were ready");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    let backoff = Backoff::new(engine.config().gate_backoff, engine.config().max_backoff);
    let dest_store: &PgStore = &destination;
    match retry_unavailable(
        "destination migration",
        backoff,
        &mut stop,
        SyncError::Destination,
        move || dest_store.migrate_destination(),
    )
    .await
    {
        Ok(()) => {}
        Err(SyncError::Cancelled) => {
            tracing::info!("Stopped before the destination schema was ready");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    let stats = engine.run_loop(stop).await;
    tracing::info!(inserted = stats.inserted, "Sync job exiting");

    source.close().await;
    destination.close().await;

    Ok(())
}
