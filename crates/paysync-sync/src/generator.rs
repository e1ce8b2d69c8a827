//! Synthetic transaction producer.
//!
//! Feeds the source table with random transactions so the rest of the
//! pipeline has something to move. Interfaces and statuses are drawn
//! uniformly; amounts are uniform between 10.00 and 500.00.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use paysync_core::{Interface, NewTransaction, TxStatus};
use paysync_store::{PoolSettings, SourceStore};
use rand::Rng;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::{env_secs, pool_settings_from_env, DEFAULT_SOURCE_URL};
use crate::shutdown::Shutdown;

/// Smallest generated amount, in cents.
const MIN_AMOUNT_CENTS: i64 = 1_000;

/// Largest generated amount, in cents.
const MAX_AMOUNT_CENTS: i64 = 50_000;

/// Configuration for the generator.
#[derive(Clone)]
pub struct GeneratorConfig {
    /// Source database URL (`SOURCE_DATABASE_URL`).
    pub source_url: String,

    /// Pause between inserts (`GENERATOR_INTERVAL_SECONDS`, default 2).
    pub interval: Duration,

    /// Pause after a failed insert (default 5).
    pub retry_delay: Duration,

    /// Pool and timeout settings.
    pub pool: PoolSettings,
}

impl GeneratorConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            source_url: std::env::var("SOURCE_DATABASE_URL").unwrap_or(defaults.source_url),
            interval: env_secs("GENERATOR_INTERVAL_SECONDS").unwrap_or(defaults.interval),
            retry_delay: defaults.retry_delay,
            pool: pool_settings_from_env(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.into(),
            interval: Duration::from_secs(2),
            retry_delay: Duration::from_secs(5),
            pool: PoolSettings::default(),
        }
    }
}

impl fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("interval", &self.interval)
            .field("retry_delay", &self.retry_delay)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// Draw a random transaction stamped at `now`.
pub fn random_transaction<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> NewTransaction {
    let interface = Interface::KNOWN[rng.gen_range(0..Interface::KNOWN.len())].clone();
    let status = match rng.gen_range(0..3) {
        0 => TxStatus::Accepted,
        1 => TxStatus::reject_tech(),
        _ => TxStatus::reject_func(),
    };
    let cents = rng.gen_range(MIN_AMOUNT_CENTS..=MAX_AMOUNT_CENTS);

    NewTransaction {
        interface,
        timestamp: now,
        status,
        amount: Decimal::new(cents, 2),
    }
}

/// Insert random transactions until stopped. Returns how many were inserted.
pub async fn run_generator<R: Rng + Send>(
    store: &dyn SourceStore,
    config: &GeneratorConfig,
    rng: &mut R,
    mut shutdown: Shutdown,
) -> u64 {
    let mut inserted = 0u64;

    loop {
        let transaction = random_transaction(rng, Utc::now());
        let delay = match store.insert(&transaction).await {
            Ok(row) => {
                inserted += 1;
                info!(
                    id = row.id.get(),
                    interface = %row.interface,
                    status = %row.status,
                    amount = %row.amount,
                    "Inserted transaction"
                );
                config.interval
            }
            Err(e) => {
                warn!(error = %e, retry_in = ?config.retry_delay, "Source database not ready, retrying");
                config.retry_delay
            }
        };

        if shutdown.sleep(delay).await {
            break;
        }
    }

    info!(inserted, "Generator stopped");
    inserted
}
