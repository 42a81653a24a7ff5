//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during audit log and store operations.
///
/// Business outcomes such as downgrades or lost races are reported through
/// `CommandResult`, never through this type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Payload serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Canonical encoding of state failed.
    #[error("encoding error: {0}")]
    Encoding(#[from] ocpi_node_core::CoreError),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A logged command this build does not understand.
    #[error("unknown command in audit log: {0}")]
    UnknownCommand(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The audit log refused the append.
    #[error("audit log unavailable: {0}")]
    Unavailable(String),

    /// A background task died before finishing.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// Slow-storage lookup failed.
    #[error("archive lookup failed: {0}")]
    Archive(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
