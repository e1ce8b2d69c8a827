//! In-memory duplicate filter.
//!
//! The destination id set is fetched once per cycle and candidates are
//! checked against it here, so a cycle costs one round trip regardless of
//! how many candidates it sees. The destination primary key remains the
//! authoritative duplicate check; this filter only avoids sending rows that
//! are known to be present.

use std::collections::HashSet;

use crate::{SourceTransaction, TransactionId};

/// Keep the candidates whose id is not in `existing`, preserving order.
///
/// Repeated ids inside `candidates` are collapsed to their first occurrence.
#[must_use]
pub fn partition_new(
    candidates: Vec<SourceTransaction>,
    existing: &HashSet<TransactionId>,
) -> Vec<SourceTransaction> {
    let mut seen = HashSet::with_capacity(candidates.len());
    candidates
        .into_iter()
        .filter(|tx| !existing.contains(&tx.id) && seen.insert(tx.id))
        .collect()
}

/// Largest id in a batch.
#[must_use]
pub fn max_id(rows: &[SourceTransaction]) -> Option<TransactionId> {
    rows.iter().map(|tx| tx.id).max()
}
