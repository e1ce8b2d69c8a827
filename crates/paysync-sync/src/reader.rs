//! Source reader.
//!
//! The reader only decides which source rows are candidates for a cycle.
//! Deciding which candidates are new is the engine's job.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use paysync_core::{SourceTransaction, TransactionId};
use paysync_store::{SourceStore, StoreError};

/// How candidate rows are selected from the source table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadPolicy {
    /// Read the whole table every cycle.
    FullScan,

    /// Read only rows above the last synchronized id.
    #[default]
    HighWatermark,
}

impl ReadPolicy {
    /// Get the policy name as a string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullScan => "full",
            Self::HighWatermark => "watermark",
        }
    }
}

impl fmt::Display for ReadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unknown policy name.
#[derive(Debug, thiserror::Error)]
#[error("unknown read policy: {0}")]
pub struct UnknownPolicy(String);

impl FromStr for ReadPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "full_scan" | "fullscan" => Ok(Self::FullScan),
            "watermark" | "high_watermark" | "incremental" => Ok(Self::HighWatermark),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

/// Reads candidate rows from the source store.
#[derive(Clone)]
pub struct SourceReader {
    store: Arc<dyn SourceStore>,
    policy: ReadPolicy,
    batch_size: Option<usize>,
}

impl SourceReader {
    /// Create a reader over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn SourceStore>, policy: ReadPolicy, batch_size: Option<usize>) -> Self {
        Self {
            store,
            policy,
            batch_size,
        }
    }

    /// The configured policy.
    #[must_use]
    pub fn policy(&self) -> ReadPolicy {
        self.policy
    }

    /// Read this cycle's candidates in ascending id order.
    ///
    /// `watermark` is ignored under [`ReadPolicy::FullScan`].
    ///
    /// # Errors
    ///
    /// Returns an error if the source read fails.
    pub async fn read_candidates(
        &self,
        watermark: Option<TransactionId>,
    ) -> Result<Vec<SourceTransaction>, StoreError> {
        match self.policy {
            ReadPolicy::FullScan => self.store.read_all().await,
            ReadPolicy::HighWatermark => self.store.read_after(watermark, self.batch_size).await,
        }
    }
}
