//! API handlers.

pub mod health;
pub mod stats;
pub mod transactions;
