//! Error types for paysync core types.

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while building or parsing core types.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A transaction identifier could not be parsed.
    #[error("invalid transaction id: {0}")]
    InvalidId(String),

    /// A transaction identifier is outside the accepted range.
    #[error("transaction id out of range: {0}")]
    IdOutOfRange(i64),
}
