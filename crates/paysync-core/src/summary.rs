//! Aggregate statistics over fact transactions.

use serde::{Deserialize, Serialize};

use crate::TxStatus;

/// Counts of accepted and rejected transactions in the fact table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransactionSummary {
    /// Total number of rows.
    pub total: u64,

    /// Rows with status `ACCEPTED`.
    pub accepted: u64,

    /// Rows whose status starts with `REJECT`.
    pub rejected: u64,

    /// `rejected / total * 100`, or 0 when there are no rows.
    pub reject_rate: f64,
}

impl TransactionSummary {
    /// Build a summary from raw counts.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(total: u64, accepted: u64, rejected: u64) -> Self {
        let reject_rate = if total > 0 {
            rejected as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total,
            accepted,
            rejected,
            reject_rate,
        }
    }

    /// Summarize a sequence of statuses.
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a TxStatus>) -> Self {
        let (mut total, mut accepted, mut rejected) = (0, 0, 0);
        for status in statuses {
            total += 1;
            if status.is_accepted() {
                accepted += 1;
            } else if status.is_rejected() {
                rejected += 1;
            }
        }
        Self::from_counts(total, accepted, rejected)
    }
}
