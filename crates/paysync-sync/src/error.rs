//! Error types for the sync engine.

use paysync_store::StoreError;

/// Errors that can end a sync cycle or the sync loop.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Reading from the source database failed.
    #[error("source error: {0}")]
    Source(#[source] StoreError),

    /// Reading from or writing to the destination database failed.
    #[error("destination error: {0}")]
    Destination(#[source] StoreError),

    /// An operator stop arrived before the engine was ready.
    #[error("sync stopped")]
    Cancelled,
}

impl SyncError {
    /// Whether the failure is a database being unreachable.
    ///
    /// Connectivity failures are retried with backoff; anything else is
    /// retried on the regular interval.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Source(err) | Self::Destination(err) => err.is_connectivity(),
            Self::Cancelled => false,
        }
    }

    /// Which database the failure came from, for log fields.
    #[must_use]
    pub fn side(&self) -> &'static str {
        match self {
            Self::Source(_) => "source",
            Self::Destination(_) => "destination",
            Self::Cancelled => "none",
        }
    }

    /// What a failed cycle left behind.
    ///
    /// Source failures happen before anything is written; destination
    /// failures may interrupt a batch, which is then rolled back.
    #[must_use]
    pub fn cycle_outcome(&self) -> &'static str {
        match self {
            Self::Source(_) => "Sync cycle failed reading the source, nothing written",
            Self::Destination(_) => "Sync cycle failed at the destination, batch rolled back",
            Self::Cancelled => "Sync cycle cancelled",
        }
    }
}
