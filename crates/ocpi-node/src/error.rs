//! Error types for the node.

use ocpi_node_core::CoreError;
use ocpi_node_perms::RegistryError;
use ocpi_node_store::StoreError;
use thiserror::Error;

/// Errors that can occur while opening, running or closing a node.
///
/// Request handlers never return these; their failures are encoded in the
/// OCPI response envelope.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Encoding error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An administrative command was refused.
    #[error("{command} rejected: {message}")]
    Rejected {
        command: &'static str,
        message: String,
    },
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
