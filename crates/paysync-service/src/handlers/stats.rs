//! Aggregate statistics.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use paysync_core::TransactionSummary;

use crate::error::ApiError;
use crate::state::AppState;

/// Accepted/rejected counts and reject rate over the whole fact table.
pub async fn summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TransactionSummary>, ApiError> {
    let summary = state.store.summary().await?;
    Ok(Json(summary))
}
