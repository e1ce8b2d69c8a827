//! Payment transaction types.
//!
//! A `SourceTransaction` is written by the producer into the source
//! database. The sync engine copies it into the fact table as a
//! `FactTransaction`, stamping the moment it was loaded.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TransactionId;

/// Prefix shared by every rejected status tag.
pub const REJECT_PREFIX: &str = "REJECT";

/// Status tag for accepted transactions.
pub const ACCEPTED: &str = "ACCEPTED";

/// A transaction as recorded in the source database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTransaction {
    /// Source-assigned identifier.
    pub id: TransactionId,

    /// Channel the transaction came through.
    pub interface: Interface,

    /// When the transaction happened.
    pub timestamp: DateTime<Utc>,

    /// Authorization outcome.
    pub status: TxStatus,

    /// Transaction amount.
    pub amount: Decimal,
}

impl SourceTransaction {
    /// Build the fact row for this transaction, loaded at `loaded_at`.
    #[must_use]
    pub fn into_fact(self, loaded_at: DateTime<Utc>) -> FactTransaction {
        FactTransaction {
            id: self.id,
            interface: self.interface,
            timestamp: self.timestamp,
            status: self.status,
            amount: self.amount,
            loaded_at,
        }
    }
}

/// A transaction about to be written to the source database.
///
/// The source assigns the identifier on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    /// Channel the transaction came through.
    pub interface: Interface,

    /// When the transaction happened.
    pub timestamp: DateTime<Utc>,

    /// Authorization outcome.
    pub status: TxStatus,

    /// Transaction amount.
    pub amount: Decimal,
}

impl NewTransaction {
    /// Attach the identifier assigned by the source.
    #[must_use]
    pub fn with_id(self, id: TransactionId) -> SourceTransaction {
        SourceTransaction {
            id,
            interface: self.interface,
            timestamp: self.timestamp,
            status: self.status,
            amount: self.amount,
        }
    }
}

/// A transaction as stored in the destination fact table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactTransaction {
    /// Identifier copied from the source row.
    pub id: TransactionId,

    /// Channel the transaction came through.
    pub interface: Interface,

    /// When the transaction happened.
    pub timestamp: DateTime<Utc>,

    /// Authorization outcome.
    pub status: TxStatus,

    /// Transaction amount.
    pub amount: Decimal,

    /// When the sync engine wrote this row.
    pub loaded_at: DateTime<Utc>,
}

impl FactTransaction {
    /// Whether this fact row carries exactly the payload of `source`.
    #[must_use]
    pub fn matches_source(&self, source: &SourceTransaction) -> bool {
        self.id == source.id
            && self.interface == source.interface
            && self.timestamp == source.timestamp
            && self.status == source.status
            && self.amount == source.amount
    }
}

/// Channel a transaction was made through.
///
/// Unknown tags are preserved verbatim so that copying a row never alters it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Interface {
    /// Cash machine.
    Atm,

    /// Point-of-sale terminal.
    Pos,

    /// Visa card network.
    Visa,

    /// Mastercard card network.
    Mastercard,

    /// Any other channel tag.
    Custom(String),
}

impl Interface {
    /// The channels the generator draws from.
    pub const KNOWN: [Interface; 4] = [Self::Atm, Self::Pos, Self::Visa, Self::Mastercard];

    /// Get the interface tag as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Atm => "ATM",
            Self::Pos => "POS",
            Self::Visa => "VISA",
            Self::Mastercard => "MASTERCARD",
            Self::Custom(tag) => tag,
        }
    }
}

impl From<String> for Interface {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "ATM" => Self::Atm,
            "POS" => Self::Pos,
            "VISA" => Self::Visa,
            "MASTERCARD" => Self::Mastercard,
            _ => Self::Custom(tag),
        }
    }
}

impl From<&str> for Interface {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<Interface> for String {
    fn from(interface: Interface) -> Self {
        match interface {
            Interface::Custom(tag) => tag,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization outcome of a transaction.
///
/// Rejections keep their full tag (`REJECT_TECH`, `REJECT_FUNC`, ...) so the
/// stored string is reproduced exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TxStatus {
    /// The transaction was accepted.
    Accepted,

    /// The transaction was rejected; holds the full tag.
    Rejected(String),

    /// Any tag that is neither accepted nor rejected.
    Other(String),
}

impl TxStatus {
    /// Technical rejection.
    #[must_use]
    pub fn reject_tech() -> Self {
        Self::Rejected("REJECT_TECH".into())
    }

    /// Functional rejection.
    #[must_use]
    pub fn reject_func() -> Self {
        Self::Rejected("REJECT_FUNC".into())
    }

    /// Get the status tag as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Accepted => ACCEPTED,
            Self::Rejected(tag) | Self::Other(tag) => tag,
        }
    }

    /// Whether the status counts as accepted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// Whether the status counts as rejected.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// The rejection reason (`TECH` for `REJECT_TECH`), if rejected.
    #[must_use]
    pub fn reject_reason(&self) -> Option<&str> {
        match self {
            Self::Rejected(tag) => Some(
                tag.strip_prefix(REJECT_PREFIX)
                    .unwrap_or(tag)
                    .trim_start_matches('_'),
            ),
            _ => None,
        }
    }
}

impl From<String> for TxStatus {
    fn from(tag: String) -> Self {
        if tag == ACCEPTED {
            Self::Accepted
        } else if tag.starts_with(REJECT_PREFIX) {
            Self::Rejected(tag)
        } else {
            Self::Other(tag)
        }
    }
}

impl From<&str> for TxStatus {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<TxStatus> for String {
    fn from(status: TxStatus) -> Self {
        match status {
            TxStatus::Accepted => ACCEPTED.to_string(),
            TxStatus::Rejected(tag) | TxStatus::Other(tag) => tag,
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
