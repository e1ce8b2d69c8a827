//! Application state.

use std::sync::Arc;

use paysync_store::FactQuery;

use crate::config::ServiceConfig;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Read-only view of the fact table.
    pub store: Arc<dyn FactQuery>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn FactQuery>, config: ServiceConfig) -> Self {
        Self { store, config }
    }
}
