//! Core types and utilities for paysync.
//!
//! This crate provides the foundational types shared by the sync engine,
//! the storage layer and the query API:
//!
//! - **Identifiers**: `TransactionId`
//! - **Transactions**: `SourceTransaction`, `FactTransaction`, `Interface`, `TxStatus`
//! - **Aggregates**: `TransactionSummary`
//! - **Filtering**: `partition_new`, the in-memory duplicate filter
//!
//! # Amounts
//!
//! Amounts are `rust_decimal::Decimal` with two fractional digits, matching
//! the `NUMERIC(12,2)` columns of both databases. They are never converted
//! to floating point inside the pipeline.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod filter;
pub mod ids;
pub mod summary;
pub mod transaction;

pub use error::{CoreError, Result};
pub use filter::{max_id, partition_new};
pub use ids::TransactionId;
pub use summary::TransactionSummary;
pub use transaction::{FactTransaction, Interface, NewTransaction, SourceTransaction, TxStatus};
