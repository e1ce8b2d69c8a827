//! Common test utilities for paysync service integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal_macros::dec;

use paysync_core::{FactTransaction, Interface, TransactionId, TxStatus};
use paysync_service::{create_router, AppState, ServiceConfig};
use paysync_store::MemoryStore;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The fact table behind the server.
    pub store: Arc<MemoryStore>,
}

impl TestHarness {
    /// Create a new test harness with an empty fact table.
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Create a harness with a custom configuration.
    pub fn with_config(config: ServiceConfig) -> Self {
        let store = Arc::new(MemoryStore::new("destination"));

        let state = AppState::new(store.clone(), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self { server, store }
    }

    /// Insert fact rows directly.
    pub fn seed(&self, rows: impl IntoIterator<Item = FactTransaction>) {
        self.store.seed_facts(rows).expect("Failed to seed facts");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration suitable for tests.
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        ..ServiceConfig::default()
    }
}

/// A fixed point in time, `minutes` after 2024-05-01 09:00 UTC.
pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
}

/// A fact row with the given id, timestamp offset and status.
pub fn fact(id: i64, minutes: i64, status: TxStatus) -> FactTransaction {
    FactTransaction {
        id: TransactionId::new(id),
        interface: Interface::Pos,
        timestamp: at(minutes),
        status,
        amount: dec!(125.50),
        loaded_at: at(minutes + 1),
    }
}
