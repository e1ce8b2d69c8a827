//! Incremental synchronization of payment transactions.
//!
//! This crate moves rows from the source `transactions` table into the
//! destination `fact_transactions` table, exactly once per source id, on a
//! fixed interval for as long as the process runs.
//!
//! - [`ConnectionGate`] waits out databases that are still starting.
//! - [`SourceReader`] selects candidate rows, by full scan or high-watermark.
//! - [`SyncEngine`] runs cycles: read, filter duplicates, commit atomically.
//! - [`generator`] produces synthetic source rows for local deployments.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use paysync_store::{PgEndpoint, PgStore};
//! use paysync_sync::{shutdown, SyncConfig, SyncEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::from_env();
//! let source_endpoint = PgEndpoint::parse("source", &config.source_url)?;
//! let dest_endpoint = PgEndpoint::parse("destination", &config.destination_url)?;
//!
//! let source = Arc::new(PgStore::connect_lazy(&source_endpoint, &config.pool));
//! let destination = Arc::new(PgStore::connect_lazy(&dest_endpoint, &config.pool));
//!
//! let (trigger, shutdown) = shutdown::channel();
//! tokio::spawn(shutdown::stop_on_signal(trigger));
//!
//! let engine = SyncEngine::new(source, destination, config);
//! let stats = engine.run(&source_endpoint, &dest_endpoint, shutdown).await?;
//! println!("inserted {} rows", stats.inserted);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod backoff;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod generator;
pub mod reader;
pub mod shutdown;

pub use backoff::{retry_unavailable, Backoff};
pub use config::SyncConfig;
pub use engine::{CycleReport, RunStats, SyncEngine, SyncState};
pub use error::SyncError;
pub use gate::ConnectionGate;
pub use reader::{ReadPolicy, SourceReader};
pub use shutdown::{Shutdown, ShutdownTrigger};

/// Install the `tracing` subscriber used by the binaries.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,paysync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
