//! Paysync Client SDK.
//!
//! A typed client for the paysync query API, as used by the dashboard.
//!
//! # Example
//!
//! ```no_run
//! use paysync_client::PaysyncClient;
//!
//! # async fn example() -> Result<(), paysync_client::ClientError> {
//! let client = PaysyncClient::new("http://paysync-service:8000")?;
//!
//! let summary = client.summary().await?;
//! println!("reject rate: {:.1}%", summary.reject_rate);
//!
//! for tx in client.list_transactions(5).await? {
//!     println!("{} {} {} {}", tx.id, tx.interface, tx.status, tx.amount);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, PaysyncClient};
pub use error::ClientError;
pub use paysync_core::{FactTransaction, TransactionSummary};
pub use types::*;
