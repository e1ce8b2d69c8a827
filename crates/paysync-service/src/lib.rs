//! Paysync query API.
//!
//! Read-only HTTP access to the destination fact table, for the dashboard:
//!
//! - `GET /transactions?limit=N` - most recent transactions, newest first
//! - `GET /stats/summary` - accepted/rejected counts and reject rate
//! - `GET /health` - liveness
//!
//! The data routes are mounted both at the root and under `/api`. The API
//! only ever reports what the sync job has committed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
