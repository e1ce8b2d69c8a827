//! In-memory storage implementation.
//!
//! `MemoryStore` implements every storage trait over plain collections so the
//! sync engine and the query API can be exercised without a database. It can
//! also simulate the failures the engine has to survive: an unreachable
//! database, a readiness probe that fails a number of times, and a write that
//! fails partway through a batch.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use paysync_core::{
    FactTransaction, NewTransaction, SourceTransaction, TransactionId, TransactionSummary,
};

use crate::error::{Result, StoreError};
use crate::{BatchOutcome, FactBatch, FactQuery, FactStore, Probe, SourceStore};

#[derive(Debug, Default)]
struct State {
    source: BTreeMap<TransactionId, SourceTransaction>,
    facts: BTreeMap<TransactionId, FactTransaction>,
    checkpoints: HashMap<String, TransactionId>,
    offline: bool,
    failing_pings: u32,
    pings: u64,
    fail_batch_at: Option<usize>,
}

/// In-memory store usable as source, destination, or both.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State::default()),
        }
    }

    /// Create a store pre-filled with source rows.
    #[must_use]
    pub fn with_source(
        name: impl Into<String>,
        rows: impl IntoIterator<Item = SourceTransaction>,
    ) -> Self {
        let store = Self::new(name);
        if let Ok(mut state) = store.state.lock() {
            for row in rows {
                state.source.insert(row.id, row);
            }
        }
        store
    }

    /// Add or replace a source row, keeping its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn push_source(&self, row: SourceTransaction) -> Result<()> {
        self.lock()?.source.insert(row.id, row);
        Ok(())
    }

    /// Simulate the database going away (`true`) or coming back (`false`).
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn set_offline(&self, offline: bool) -> Result<()> {
        self.lock()?.offline = offline;
        Ok(())
    }

    /// Make the next `count` readiness probes fail.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn fail_next_pings(&self, count: u32) -> Result<()> {
        self.lock()?.failing_pings = count;
        Ok(())
    }

    /// Number of readiness probes received so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn ping_count(&self) -> Result<u64> {
        Ok(self.lock()?.pings)
    }

    /// Make the next batch fail when it reaches row `row` (0-based).
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn fail_next_batch_at(&self, row: usize) -> Result<()> {
        self.lock()?.fail_batch_at = Some(row);
        Ok(())
    }

    /// Snapshot of the fact table, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn facts(&self) -> Result<Vec<FactTransaction>> {
        Ok(self.lock()?.facts.values().cloned().collect())
    }

    /// Insert fact rows directly, bypassing batches and checkpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the store lock is poisoned.
    pub fn seed_facts(&self, rows: impl IntoIterator<Item = FactTransaction>) -> Result<()> {
        let mut state = self.lock()?;
        for row in rows {
            state.facts.insert(row.id, row);
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }

    /// Lock the state for a data operation, failing if offline.
    fn online(&self) -> Result<MutexGuard<'_, State>> {
        let state = self.lock()?;
        if state.offline {
            return Err(StoreError::Unavailable(format!("{} is offline", self.name)));
        }
        Ok(state)
    }
}

#[async_trait]
impl Probe for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.pings += 1;

        if state.failing_pings > 0 {
            state.failing_pings -= 1;
            return Err(StoreError::Unavailable(format!("{} is starting", self.name)));
        }
        if state.offline {
            return Err(StoreError::Unavailable(format!("{} is offline", self.name)));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn read_all(&self) -> Result<Vec<SourceTransaction>> {
        Ok(self.online()?.source.values().cloned().collect())
    }

    async fn read_after(
        &self,
        after: Option<TransactionId>,
        limit: Option<usize>,
    ) -> Result<Vec<SourceTransaction>> {
        let state = self.online()?;
        let rows = state
            .source
            .values()
            .filter(|row| after.map_or(true, |after| row.id > after))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(rows)
    }

    async fn insert(&self, transaction: &NewTransaction) -> Result<SourceTransaction> {
        let mut state = self.online()?;
        let next = state.source.keys().next_back().map_or(1, |id| id.get() + 1);
        let row = transaction.clone().with_id(TransactionId::new(next));
        state.source.insert(row.id, row.clone());
        Ok(row)
    }
}

#[async_trait]
impl FactStore for MemoryStore {
    async fn existing_ids(&self, after: Option<TransactionId>) -> Result<HashSet<TransactionId>> {
        let state = self.online()?;
        Ok(state
            .facts
            .keys()
            .copied()
            .filter(|id| after.map_or(true, |after| *id > after))
            .collect())
    }

    async fn checkpoint(&self, pipeline: &str) -> Result<Option<TransactionId>> {
        Ok(self.online()?.checkpoints.get(pipeline).copied())
    }

    async fn insert_batch(&self, batch: &FactBatch) -> Result<BatchOutcome> {
        let mut state = self.online()?;
        let fail_at = state.fail_batch_at.take();

        // Stage everything first so a failure leaves the table untouched.
        let mut staged: BTreeMap<TransactionId, FactTransaction> = BTreeMap::new();
        let mut skipped = 0u64;
        for (index, row) in batch.rows.iter().enumerate() {
            if fail_at == Some(index) {
                return Err(StoreError::InjectedFailure { row: index });
            }
            if state.facts.contains_key(&row.id) || staged.contains_key(&row.id) {
                skipped += 1;
                continue;
            }
            staged.insert(row.id, row.clone());
        }

        let inserted = staged.len() as u64;
        state.facts.append(&mut staged);

        if let Some(watermark) = batch.watermark {
            let entry = state
                .checkpoints
                .entry(batch.pipeline.clone())
                .or_insert(watermark);
            *entry = (*entry).max(watermark);
        }

        Ok(BatchOutcome { inserted, skipped })
    }
}

#[async_trait]
impl FactQuery for MemoryStore {
    async fn list_recent(&self, limit: usize) -> Result<Vec<FactTransaction>> {
        let state = self.online()?;
        let mut rows: Vec<FactTransaction> = state.facts.values().cloned().collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn summary(&self) -> Result<TransactionSummary> {
        let state = self.online()?;
        Ok(TransactionSummary::from_statuses(
            state.facts.values().map(|row| &row.status),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use paysync_core::{Interface, TxStatus};
    use rust_decimal_macros::dec;

    fn source(id: i64) -> SourceTransaction {
        SourceTransaction {
            id: TransactionId::new(id),
            interface: Interface::Atm,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(id),
            status: TxStatus::Accepted,
            amount: dec!(42.00),
        }
    }

    fn batch(ids: &[i64], watermark: Option<i64>) -> FactBatch {
        FactBatch {
            pipeline: "test".into(),
            rows: ids
                .iter()
                .map(|id| source(*id).into_fact(Utc::now()))
                .collect(),
            watermark: watermark.map(TransactionId::new),
        }
    }

    #[tokio::test]
    async fn read_after_respects_bounds() {
        let store = MemoryStore::with_source("src", (1..=5).map(source));

        let rows = store
            .read_after(Some(TransactionId::new(2)), Some(2))
            .await
            .unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id.get()).collect();
        assert_eq!(ids, vec![3, 4]);

        assert_eq!(store.read_after(None, None).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn insert_assigns_next_id() {
        let store = MemoryStore::with_source("src", [source(7)]);
        let new = NewTransaction {
            interface: Interface::Pos,
            timestamp: Utc::now(),
            status: TxStatus::reject_func(),
            amount: dec!(10.50),
        };

        let row = store.insert(&new).await.unwrap();
        assert_eq!(row.id, TransactionId::new(8));
    }

    #[tokio::test]
    async fn batch_skips_existing_rows() {
        let store = MemoryStore::new("dst");
        store.insert_batch(&batch(&[1, 2], Some(2))).await.unwrap();

        let outcome = store.insert_batch(&batch(&[2, 3], Some(3))).await.unwrap();
        assert_eq!(outcome, BatchOutcome { inserted: 1, skipped: 1 });
        assert_eq!(store.facts().unwrap().len(), 3);
        assert_eq!(
            store.checkpoint("test").await.unwrap(),
            Some(TransactionId::new(3))
        );
    }

    #[tokio::test]
    async fn failed_batch_is_invisible() {
        let store = MemoryStore::new("dst");
        store.fail_next_batch_at(3).unwrap();

        let err = store
            .insert_batch(&batch(&[1, 2, 3, 4, 5], Some(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InjectedFailure { row: 3 }));
        assert!(store.facts().unwrap().is_empty());
        assert_eq!(store.checkpoint("test").await.unwrap(), None);

        // The injection is one-shot.
        store
            .insert_batch(&batch(&[1, 2, 3, 4, 5], Some(5)))
            .await
            .unwrap();
        assert_eq!(store.facts().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn checkpoint_never_moves_backwards() {
        let store = MemoryStore::new("dst");
        store.insert_batch(&batch(&[9], Some(9))).await.unwrap();
        store.insert_batch(&batch(&[4], Some(4))).await.unwrap();

        assert_eq!(
            store.checkpoint("test").await.unwrap(),
            Some(TransactionId::new(9))
        );
    }

    #[tokio::test]
    async fn offline_store_is_unavailable() {
        let store = MemoryStore::new("dst");
        store.set_offline(true).unwrap();

        assert!(store.summary().await.unwrap_err().is_connectivity());
        assert!(store.ping().await.is_err());

        store.set_offline(false).unwrap();
        assert!(store.ping().await.is_ok());
        assert_eq!(store.ping_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn pings_fail_the_requested_number_of_times() {
        let store = MemoryStore::new("dst");
        store.fail_next_pings(2).unwrap();

        assert!(store.ping().await.is_err());
        assert!(store.ping().await.is_err());
        assert!(store.ping().await.is_ok());
    }
}
