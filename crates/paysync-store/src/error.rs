//! Error types for paysync storage.

use std::time::Duration;

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// SQLSTATE class for connection exceptions.
const CONNECTION_EXCEPTION_CLASS: &str = "08";

/// `admin_shutdown`, `crash_shutdown` and `cannot_connect_now`: the server
/// is restarting or still starting up.
const SERVER_NOT_READY: [&str; 3] = ["57P01", "57P02", "57P03"];

/// Whether a SQLSTATE means the server cannot serve the request right now.
fn is_unavailable_code(code: &str) -> bool {
    code.starts_with(CONNECTION_EXCEPTION_CLASS) || SERVER_NOT_READY.contains(&code)
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database could not be reached.
    #[error("database unavailable: {0}")]
    Unavailable(String),

    /// An operation did not finish within its time budget.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
        /// The budget that was exceeded.
        after: Duration,
    },

    /// A unique constraint rejected a write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// A write failure injected by the in-memory backend.
    #[error("injected write failure at row {row}")]
    InjectedFailure {
        /// Index of the row in the batch that failed.
        row: usize,
    },
}

impl StoreError {
    /// Whether the error means the database is unreachable rather than
    /// that the request itself was wrong.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::Unavailable(err.to_string()),
            sqlx::Error::Database(ref db_err)
                if db_err.code().is_some_and(|code| is_unavailable_code(&code)) =>
            {
                Self::Unavailable(db_err.message().to_string())
            }
            sqlx::Error::Database(ref db_err)
                if db_err.code().is_some_and(|code| code == UNIQUE_VIOLATION) =>
            {
                Self::Conflict(db_err.message().to_string())
            }
            other => Self::Database(other.to_string()),
        }
    }
}

// A migration that fails because the database went away is a connectivity
// failure like any other; only a broken migration is a `Migration` error.
impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        use sqlx::migrate::MigrateError;

        match err {
            MigrateError::Execute(inner) | MigrateError::ExecuteMigration(inner, _) => {
                match Self::from(inner) {
                    unavailable if unavailable.is_connectivity() => unavailable,
                    other => Self::Migration(other.to_string()),
                }
            }
            other => Self::Migration(other.to_string()),
        }
    }
}
