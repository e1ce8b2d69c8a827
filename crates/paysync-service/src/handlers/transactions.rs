//! Transaction listing.

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use paysync_core::FactTransaction;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;

/// Rows returned when no limit is given.
pub const DEFAULT_LIMIT: usize = 10;

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Maximum number of transactions to return (default: 10).
    pub limit: Option<i64>,
}

/// List the most recent transactions, newest first.
///
/// `limit` is clamped to `1..=max_list_limit`.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListTransactionsQuery>, QueryRejection>,
) -> Result<Json<Vec<FactTransaction>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let limit = effective_limit(query.limit, state.config.max_list_limit);

    let rows = state.store.list_recent(limit).await?;
    tracing::debug!(limit, returned = rows.len(), "Listed transactions");

    Ok(Json(rows))
}

fn effective_limit(requested: Option<i64>, max: usize) -> usize {
    let max = max.max(1);
    match requested {
        None => DEFAULT_LIMIT.min(max),
        Some(n) if n < 1 => 1,
        Some(n) => usize::try_from(n).map_or(max, |n| n.min(max)),
    }
}
