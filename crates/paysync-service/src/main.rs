//! Paysync Service - HTTP query API over the fact table.
//!
//! This is the main entry point for the paysync service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paysync_service::{create_router, AppState, ServiceConfig};
use paysync_store::{PgEndpoint, PgStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,paysync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Paysync Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();
    tracing::info!(?config, "Service configuration loaded");

    // The pool connects on demand, so the API starts even while the
    // database is still coming up and answers 503 until it is reachable.
    let endpoint = PgEndpoint::parse("destination", &config.database_url)?;
    let store = Arc::new(PgStore::connect_lazy(&endpoint, &config.pool));
    if let Err(e) = store.migrate_destination().await {
        tracing::warn!(error = %e, "Could not apply destination migrations, continuing");
    }

    // Build app state
    let state = AppState::new(store.clone(), config.clone());

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
