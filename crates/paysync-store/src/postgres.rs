//! PostgreSQL storage implementation.
//!
//! [`PgStore`] wraps a `sqlx` connection pool and implements both
//! [`SourceStore`] and [`FactStore`]; the sync engine holds one store per
//! database. Every operation runs under the configured operation timeout, so
//! a hung connection surfaces as [`StoreError::Timeout`] instead of blocking
//! the caller forever.
//!
//! Connection strings may contain credentials and are never logged.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paysync_core::{
    FactTransaction, NewTransaction, SourceTransaction, TransactionId, TransactionSummary,
};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, FromRow, PgConnection, PgPool};

use crate::error::{Result, StoreError};
use crate::{BatchOutcome, FactBatch, FactQuery, FactStore, Probe, SourceStore};

const SELECT_SOURCE_ALL: &str = r#"
SELECT id, interface, "timestamp", status, amount
FROM transactions
ORDER BY id
"#;

// LIMIT NULL reads to the end of the table.
const SELECT_SOURCE_AFTER: &str = r#"
SELECT id, interface, "timestamp", status, amount
FROM transactions
WHERE id > $1
ORDER BY id
LIMIT $2
"#;

const INSERT_SOURCE: &str = r#"
INSERT INTO transactions (interface, "timestamp", status, amount)
VALUES ($1, $2, $3, $4)
RETURNING id
"#;

const SELECT_FACT_IDS: &str = r"
SELECT id
FROM fact_transactions
WHERE $1::BIGINT IS NULL OR id > $1
";

const INSERT_FACT: &str = r#"
INSERT INTO fact_transactions (id, interface, "timestamp", status, amount, loaded_at)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (id) DO NOTHING
"#;

const SELECT_CHECKPOINT: &str = r"
SELECT last_id
FROM sync_checkpoints
WHERE name = $1
";

const UPSERT_CHECKPOINT: &str = r"
INSERT INTO sync_checkpoints (name, last_id, updated_at)
VALUES ($1, $2, now())
ON CONFLICT (name) DO UPDATE
SET last_id = GREATEST(sync_checkpoints.last_id, EXCLUDED.last_id),
    updated_at = now()
";

const SELECT_RECENT_FACTS: &str = r#"
SELECT id, interface, "timestamp", status, amount, loaded_at
FROM fact_transactions
ORDER BY "timestamp" DESC, id DESC
LIMIT $1
"#;

const SELECT_SUMMARY: &str = r"
SELECT
    COUNT(*) AS total,
    COUNT(*) FILTER (WHERE status = 'ACCEPTED') AS accepted,
    COUNT(*) FILTER (WHERE status LIKE 'REJECT%') AS rejected
FROM fact_transactions
";

/// Connection pool tuning.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Maximum pooled connections (default: 5).
    pub max_connections: u32,

    /// How long to wait for a pooled connection (default: 10s).
    pub acquire_timeout: Duration,

    /// Upper bound for any single database operation (default: 30s).
    pub op_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(10),
            op_timeout: Duration::from_secs(30),
        }
    }
}

/// A named PostgreSQL endpoint.
///
/// The name is what gets logged; the parsed options stay private.
#[derive(Clone)]
pub struct PgEndpoint {
    name: String,
    options: PgConnectOptions,
    connect_timeout: Duration,
}

impl PgEndpoint {
    /// Parse a connection URL or libpq-style string.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the string cannot be parsed.
    pub fn parse(name: impl Into<String>, url: &str) -> Result<Self> {
        let name = name.into();
        let options = PgConnectOptions::from_str(url)
            .map_err(|e| StoreError::Database(format!("invalid connection string for {name}: {e}")))?;

        Ok(Self {
            name,
            options,
            connect_timeout: Duration::from_secs(10),
        })
    }

    /// Bound each readiness probe to `timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl fmt::Debug for PgEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgEndpoint")
            .field("name", &self.name)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Probe for PgEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<()> {
        let conn = tokio::time::timeout(
            self.connect_timeout,
            PgConnection::connect_with(&self.options),
        )
        .await
        .map_err(|_| StoreError::Timeout {
            operation: "connect",
            after: self.connect_timeout,
        })?
        // Any failure to connect, including authentication, means "not ready yet".
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        conn.close().await?;
        Ok(())
    }
}

/// PostgreSQL-backed store for either side of the pipeline.
#[derive(Clone)]
pub struct PgStore {
    name: String,
    pool: PgPool,
    op_timeout: Duration,
}

impl PgStore {
    /// Open a connection pool to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the first connection cannot be established.
    pub async fn connect(endpoint: &PgEndpoint, settings: &PoolSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect_with(endpoint.options.clone())
            .await?;

        tracing::debug!(
            endpoint = %endpoint.name,
            max_connections = settings.max_connections,
            "PostgreSQL pool opened"
        );

        Ok(Self::from_pool(
            endpoint.name.clone(),
            pool,
            settings.op_timeout,
        ))
    }

    /// Build a pool that connects on first use.
    ///
    /// Used when the endpoint may not be up yet; pair it with a readiness
    /// probe before issuing queries.
    #[must_use]
    pub fn connect_lazy(endpoint: &PgEndpoint, settings: &PoolSettings) -> Self {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect_lazy_with(endpoint.options.clone());

        Self::from_pool(endpoint.name.clone(), pool, settings.op_timeout)
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(name: impl Into<String>, pool: PgPool, op_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            pool,
            op_timeout,
        }
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the source schema (`transactions`).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Migration` if a migration fails.
    pub async fn migrate_source(&self) -> Result<()> {
        let mut migrator = sqlx::migrate!("./migrations/source");
        // Source and destination may share one database in development.
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await?;
        tracing::info!(endpoint = %self.name, "Source schema up to date");
        Ok(())
    }

    /// Apply the destination schema (`fact_transactions`, `sync_checkpoints`).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Migration` if a migration fails.
    pub async fn migrate_destination(&self) -> Result<()> {
        let mut migrator = sqlx::migrate!("./migrations/destination");
        migrator.set_ignore_missing(true);
        migrator.run(&self.pool).await?;
        tracing::info!(endpoint = %self.name, "Destination schema up to date");
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run a database future under the operation timeout.
    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, sqlx::Error>> + Send,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout {
                operation,
                after: self.op_timeout,
            }),
        }
    }
}

impl fmt::Debug for PgStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgStore")
            .field("name", &self.name)
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, FromRow)]
struct SourceRow {
    id: i64,
    interface: String,
    timestamp: DateTime<Utc>,
    status: String,
    amount: Decimal,
}

impl From<SourceRow> for SourceTransaction {
    fn from(row: SourceRow) -> Self {
        Self {
            id: TransactionId::new(row.id),
            interface: row.interface.into(),
            timestamp: row.timestamp,
            status: row.status.into(),
            amount: row.amount,
        }
    }
}

#[derive(Debug, FromRow)]
struct FactRow {
    id: i64,
    interface: String,
    timestamp: DateTime<Utc>,
    status: String,
    amount: Decimal,
    loaded_at: DateTime<Utc>,
}

impl From<FactRow> for FactTransaction {
    fn from(row: FactRow) -> Self {
        Self {
            id: TransactionId::new(row.id),
            interface: row.interface.into(),
            timestamp: row.timestamp,
            status: row.status.into(),
            amount: row.amount,
            loaded_at: row.loaded_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    total: i64,
    accepted: i64,
    rejected: i64,
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[async_trait]
impl SourceStore for PgStore {
    async fn read_all(&self) -> Result<Vec<SourceTransaction>> {
        let rows: Vec<SourceRow> = self
            .timed(
                "read source",
                sqlx::query_as(SELECT_SOURCE_ALL).fetch_all(&self.pool),
            )
            .await?;

        Ok(rows.into_iter().map(SourceTransaction::from).collect())
    }

    async fn read_after(
        &self,
        after: Option<TransactionId>,
        limit: Option<usize>,
    ) -> Result<Vec<SourceTransaction>> {
        let after = after.map_or(0, TransactionId::get);
        let limit = limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX));

        let rows: Vec<SourceRow> = self
            .timed(
                "read source",
                sqlx::query_as(SELECT_SOURCE_AFTER)
                    .bind(after)
                    .bind(limit)
                    .fetch_all(&self.pool),
            )
            .await?;

        Ok(rows.into_iter().map(SourceTransaction::from).collect())
    }

    async fn insert(&self, transaction: &NewTransaction) -> Result<SourceTransaction> {
        let id: i64 = self
            .timed(
                "insert source",
                sqlx::query_scalar(INSERT_SOURCE)
                    .bind(transaction.interface.as_str())
                    .bind(transaction.timestamp)
                    .bind(transaction.status.as_str())
                    .bind(transaction.amount)
                    .fetch_one(&self.pool),
            )
            .await?;

        Ok(transaction.clone().with_id(TransactionId::new(id)))
    }
}

#[async_trait]
impl FactStore for PgStore {
    async fn existing_ids(&self, after: Option<TransactionId>) -> Result<HashSet<TransactionId>> {
        let ids: Vec<i64> = self
            .timed(
                "read fact ids",
                sqlx::query_scalar(SELECT_FACT_IDS)
                    .bind(after.map(TransactionId::get))
                    .fetch_all(&self.pool),
            )
            .await?;

        Ok(ids.into_iter().map(TransactionId::new).collect())
    }

    async fn checkpoint(&self, pipeline: &str) -> Result<Option<TransactionId>> {
        let last_id: Option<i64> = self
            .timed(
                "read checkpoint",
                sqlx::query_scalar(SELECT_CHECKPOINT)
                    .bind(pipeline)
                    .fetch_optional(&self.pool),
            )
            .await?;

        Ok(last_id.map(TransactionId::new))
    }

    async fn insert_batch(&self, batch: &FactBatch) -> Result<BatchOutcome> {
        let write = async {
            let mut tx = self.pool.begin().await?;
            let mut inserted = 0u64;

            for row in &batch.rows {
                let result = sqlx::query(INSERT_FACT)
                    .bind(row.id.get())
                    .bind(row.interface.as_str())
                    .bind(row.timestamp)
                    .bind(row.status.as_str())
                    .bind(row.amount)
                    .bind(row.loaded_at)
                    .execute(&mut *tx)
                    .await?;
                inserted += result.rows_affected();
            }

            if let Some(watermark) = batch.watermark {
                sqlx::query(UPSERT_CHECKPOINT)
                    .bind(batch.pipeline.as_str())
                    .bind(watermark.get())
                    .execute(&mut *tx)
                    .await?;
            }

            // Dropping `tx` on any early return rolls the batch back.
            tx.commit().await?;
            Ok::<_, sqlx::Error>(inserted)
        };

        let inserted = self.timed("write batch", write).await?;
        let skipped = (batch.rows.len() as u64).saturating_sub(inserted);

        if skipped > 0 {
            tracing::debug!(
                pipeline = %batch.pipeline,
                skipped,
                "Rows already present in fact table were skipped"
            );
        }

        Ok(BatchOutcome { inserted, skipped })
    }
}

#[async_trait]
impl FactQuery for PgStore {
    async fn list_recent(&self, limit: usize) -> Result<Vec<FactTransaction>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<FactRow> = self
            .timed(
                "list facts",
                sqlx::query_as(SELECT_RECENT_FACTS)
                    .bind(limit)
                    .fetch_all(&self.pool),
            )
            .await?;

        Ok(rows.into_iter().map(FactTransaction::from).collect())
    }

    async fn summary(&self) -> Result<TransactionSummary> {
        let row: SummaryRow = self
            .timed(
                "summarize facts",
                sqlx::query_as(SELECT_SUMMARY).fetch_one(&self.pool),
            )
            .await?;

        Ok(TransactionSummary::from_counts(
            count(row.total),
            count(row.accepted),
            count(row.rejected),
        ))
    }
}
