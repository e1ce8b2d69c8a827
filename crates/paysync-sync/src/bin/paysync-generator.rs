//! Paysync generator - feeds the source table with random transactions.

use paysync_store::{PgEndpoint, PgStore, Probe};
use paysync_sync::generator::{run_generator, GeneratorConfig};
use paysync_sync::{
    init_tracing, retry_unavailable, shutdown, Backoff, ConnectionGate, SyncError,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    tracing::info!("Starting Paysync generator");

    let config = GeneratorConfig::from_env();
    tracing::info!(?config, "Generator configuration loaded");

    let endpoint = PgEndpoint::parse("source", &config.source_url)?
        .with_connect_timeout(config.pool.acquire_timeout);
    let store = PgStore::connect_lazy(&endpoint, &config.pool);

    let (trigger, mut stop) = shutdown::channel();
    tokio::spawn(shutdown::stop_on_signal(trigger));

    match ConnectionGate::new(config.retry_delay)
        .await_ready(&endpoint as &dyn Probe, &mut stop)
        .await
    {
        Ok(_) => {}
        Err(SyncError::Cancelled) => return Ok(()),
        Err(e) => return Err(e.into()),
    }

    let backoff = Backoff::new(config.retry_delay, config.retry_delay.saturating_mul(6));
    let source_store = &store;
    match retry_unavailable(
        "source migration",
        backoff,
        &mut stop,
        SyncError::Source,
        move || source_store.migrate_source(),
    )
    .await
    {
        Ok(()) => {}
        Err(SyncError::Cancelled) => return Ok(()),
        Err(e) => return Err(e.into()),
    }

    let mut rng = StdRng::from_entropy();
    run_generator(&store, &config, &mut rng, stop).await;

    store.close().await;
    Ok(())
}
