//! Identifier types for paysync.
//!
//! Transaction identifiers are assigned by the source database (`BIGSERIAL`)
//! and copied verbatim into the fact table, so the same value identifies a
//! row on both sides of the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A source-assigned transaction identifier.
///
/// Identifiers are positive and roughly monotonic: the source hands them out
/// in increasing order, but rows may become visible out of order when
/// producer transactions commit concurrently.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(i64);

impl TransactionId {
    /// Create an identifier from its raw database value.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Create an identifier, rejecting values the source never assigns.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::IdOutOfRange` for zero or negative values.
    pub fn try_new(raw: i64) -> Result<Self, CoreError> {
        if raw <= 0 {
            return Err(CoreError::IdOutOfRange(raw));
        }
        Ok(Self(raw))
    }

    /// Return the raw database value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl FromStr for TransactionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: i64 = s
            .trim()
            .parse()
            .map_err(|_| CoreError::InvalidId(s.to_string()))?;
        Self::try_new(raw)
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({})", self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<TransactionId> for i64 {
    fn from(id: TransactionId) -> Self {
        id.0
    }
}
