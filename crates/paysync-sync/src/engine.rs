//! The sync engine.
//!
//! One cycle reads candidate rows from the source, drops the ids already in
//! the fact table, and commits the rest together with the new high-watermark
//! in a single destination transaction. The loop repeats cycles on a fixed
//! interval until an operator stop.
//!
//! Each cycle recomputes the duplicate set from the destination, so nothing
//! carried between cycles has to be trusted: a failed or interrupted cycle is
//! repaired by simply running the next one.
//!
//! # States
//!
//! ```text
//! Idle → ConnectingSource → ConnectingDestination        (startup only)
//! Idle → Reading → Filtering → Writing → Committing → Sleeping → Idle ...
//! any  → Stopped                                        (operator stop)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use paysync_core::{max_id, partition_new, FactTransaction, TransactionId};
use paysync_store::{FactBatch, FactStore, Probe, SourceStore};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::gate::ConnectionGate;
use crate::reader::{ReadPolicy, SourceReader};
use crate::shutdown::Shutdown;

/// Where the engine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Between cycles, or not started.
    Idle,
    /// Waiting for the source database at startup.
    ConnectingSource,
    /// Waiting for the destination database at startup.
    ConnectingDestination,
    /// Reading candidates from the source.
    Reading,
    /// Fetching destination ids and dropping duplicates.
    Filtering,
    /// Building the batch of new fact rows.
    Writing,
    /// Committing the batch and checkpoint.
    Committing,
    /// Waiting for the next cycle.
    Sleeping,
    /// Stopped by the operator.
    Stopped,
}

impl SyncState {
    /// Get the state name as a string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ConnectingSource => "connecting_source",
            Self::ConnectingDestination => "connecting_destination",
            Self::Reading => "reading",
            Self::Filtering => "filtering",
            Self::Writing => "writing",
            Self::Committing => "committing",
            Self::Sleeping => "sleeping",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one successful cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Wall-clock time the cycle began.
    pub started_at: DateTime<Utc>,
    /// Candidate rows read from the source.
    pub read: usize,
    /// Candidates not already in the destination.
    pub new: usize,
    /// Rows written.
    pub inserted: u64,
    /// New rows that turned out to exist at write time.
    pub skipped: u64,
    /// High-watermark after the cycle.
    pub watermark: Option<TransactionId>,
    /// How long the cycle took.
    pub elapsed: Duration,
}

/// Totals over the lifetime of a sync loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Cycles that committed (including empty ones).
    pub cycles: u64,
    /// Cycles that failed and were retried.
    pub failed_cycles: u64,
    /// Rows written across all cycles.
    pub inserted: u64,
}

/// Orchestrates sync cycles between a source and a destination store.
pub struct SyncEngine {
    reader: SourceReader,
    destination: Arc<dyn FactStore>,
    config: SyncConfig,
    state: watch::Sender<SyncState>,
}

impl SyncEngine {
    /// Create an engine over the given stores.
    #[must_use]
    pub fn new(
        source: Arc<dyn SourceStore>,
        destination: Arc<dyn FactStore>,
        config: SyncConfig,
    ) -> Self {
        let reader = SourceReader::new(source, config.read_policy, config.batch_size);
        let (state, _) = watch::channel(SyncState::Idle);

        Self {
            reader,
            destination,
            config,
            state,
        }
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: SyncState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "Sync state changed");
        }
    }

    /// Block until both databases accept connections.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Cancelled` if stopped while waiting.
    pub async fn await_endpoints(
        &self,
        source: &dyn Probe,
        destination: &dyn Probe,
        shutdown: &mut Shutdown,
    ) -> Result<(), SyncError> {
        let gate = ConnectionGate::new(self.config.gate_backoff);

        self.set_state(SyncState::ConnectingSource);
        let result = gate.await_ready(source, shutdown).await;
        if let Err(e) = result {
            self.set_state(SyncState::Stopped);
            return Err(e);
        }

        self.set_state(SyncState::ConnectingDestination);
        if let Err(e) = gate.await_ready(destination, shutdown).await {
            self.set_state(SyncState::Stopped);
            return Err(e);
        }

        self.set_state(SyncState::Idle);
        Ok(())
    }

    /// Run a single sync cycle.
    ///
    /// Either every new row of the cycle is committed, together with the
    /// advanced watermark, or nothing is.
    ///
    /// # Errors
    ///
    /// Returns an error if a read or the batch write fails. Nothing has been
    /// written in that case and the next cycle starts from a fresh view.
    pub async fn run_cycle(&self) -> Result<CycleReport, SyncError> {
        let result = self.cycle().await;
        if result.is_err() {
            self.set_state(SyncState::Idle);
        }
        result
    }

    async fn cycle(&self) -> Result<CycleReport, SyncError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let pipeline = &self.config.pipeline;

        self.set_state(SyncState::Reading);
        let checkpoint = self
            .destination
            .checkpoint(pipeline)
            .await
            .map_err(SyncError::Destination)?;
        let watermark = match self.reader.policy() {
            ReadPolicy::HighWatermark => checkpoint,
            ReadPolicy::FullScan => None,
        };
        let candidates = self
            .reader
            .read_candidates(watermark)
            .await
            .map_err(SyncError::Source)?;
        let read = candidates.len();
        let highest_read = max_id(&candidates);

        self.set_state(SyncState::Filtering);
        let existing = self
            .destination
            .existing_ids(watermark)
            .await
            .map_err(SyncError::Destination)?;
        let fresh = partition_new(candidates, &existing);
        let new = fresh.len();

        // Every candidate read is either already present or about to be, so
        // the watermark may advance past all of them.
        let advanced = highest_read.filter(|high| checkpoint.map_or(true, |cp| *high > cp));

        let mut report = CycleReport {
            started_at,
            read,
            new,
            inserted: 0,
            skipped: 0,
            watermark: advanced.or(checkpoint),
            elapsed: Duration::ZERO,
        };

        if fresh.is_empty() && advanced.is_none() {
            report.elapsed = clock.elapsed();
            debug!(read, "No new transactions");
            self.set_state(SyncState::Idle);
            return Ok(report);
        }

        self.set_state(SyncState::Writing);
        let rows: Vec<FactTransaction> = fresh
            .into_iter()
            .map(|tx| tx.into_fact(Utc::now()))
            .collect();
        let batch = FactBatch {
            pipeline: pipeline.clone(),
            rows,
            watermark: advanced,
        };

        self.set_state(SyncState::Committing);
        let outcome = self
            .destination
            .insert_batch(&batch)
            .await
            .map_err(SyncError::Destination)?;

        report.inserted = outcome.inserted;
        report.skipped = outcome.skipped;
        report.elapsed = clock.elapsed();

        info!(
            inserted = report.inserted,
            skipped = report.skipped,
            read = report.read,
            watermark = ?report.watermark.map(TransactionId::get),
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "{} rows inserted into fact_transactions",
            report.inserted
        );

        self.set_state(SyncState::Idle);
        Ok(report)
    }

    /// Run cycles until `shutdown` fires.
    ///
    /// A failed cycle never ends the loop. Connectivity failures back off
    /// exponentially from `gate_backoff` up to `max_backoff`; other failures
    /// wait the regular interval. A stop is honored between cycles; a cycle
    /// already running completes or rolls back first.
    pub async fn run_loop(&self, mut shutdown: Shutdown) -> RunStats {
        let mut backoff = Backoff::new(self.config.gate_backoff, self.config.max_backoff);
        let mut stats = RunStats::default();

        info!(
            policy = %self.config.read_policy,
            interval = ?self.config.interval,
            pipeline = %self.config.pipeline,
            "Sync loop started"
        );

        while !shutdown.is_stopped() {
            let delay = match self.run_cycle().await {
                Ok(report) => {
                    stats.cycles += 1;
                    stats.inserted += report.inserted;
                    backoff.reset();
                    self.config.interval
                }
                Err(e) if e.is_connectivity() => {
                    stats.failed_cycles += 1;
                    let delay = backoff.next_delay();
                    warn!(side = e.side(), error = %e, retry_in = ?delay, "Sync cycle aborted, database unreachable");
                    delay
                }
                Err(e) => {
                    stats.failed_cycles += 1;
                    error!(
                        side = e.side(),
                        error = %e,
                        retry_in = ?self.config.interval,
                        "{}",
                        e.cycle_outcome()
                    );
                    self.config.interval
                }
            };

            self.set_state(SyncState::Sleeping);
            if shutdown.sleep(delay).await {
                break;
            }
        }

        self.set_state(SyncState::Stopped);
        info!(
            cycles = stats.cycles,
            failed_cycles = stats.failed_cycles,
            inserted = stats.inserted,
            "Sync loop stopped"
        );
        stats
    }

    /// Wait for both databases, then run the loop.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Cancelled` if stopped before the databases were ready.
    pub async fn run(
        &self,
        source: &dyn Probe,
        destination: &dyn Probe,
        mut shutdown: Shutdown,
    ) -> Result<RunStats, SyncError> {
        self.await_endpoints(source, destination, &mut shutdown)
            .await?;
        Ok(self.run_loop(shutdown).await)
    }
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
