//! Error types for the registry.

use thiserror::Error;

/// Errors that can occur during registry operations.
///
/// Conflicts, missing parties and lost races are reported through
/// `CommandResult`; this type covers infrastructure failures only.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The audit log failed.
    #[error("store error: {0}")]
    Store(#[from] ocpi_node_store::StoreError),

    /// Core error.
    #[error("core error: {0}")]
    CoreError(#[from] ocpi_node_core::CoreError),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
