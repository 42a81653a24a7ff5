//! Outcome values returned by registry and store operations.
//!
//! Expected business outcomes (duplicates, downgrades, lost races) are
//! values, not errors. Errors are reserved for I/O and broken contracts.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What a command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Created,
    Updated,
    NoOperation,
    Failed,
}

/// Why a command failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    Validation,
    NotFound,
    AlreadyExists,
    Downgrade,
    ConcurrentUpdate,
    RoleMismatch,
    Unauthorized,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Validation => "validation",
            FailureKind::NotFound => "not found",
            FailureKind::AlreadyExists => "already exists",
            FailureKind::Downgrade => "downgrade",
            FailureKind::ConcurrentUpdate => "concurrent update",
            FailureKind::RoleMismatch => "role mismatch",
            FailureKind::Unauthorized => "unauthorized",
        };
        f.write_str(s)
    }
}

/// Result of a registry or store command: outcome, optional data, optional message.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult<T> {
    pub outcome: Outcome,
    pub data: Option<T>,
    pub message: Option<String>,
    pub failure: Option<FailureKind>,
}

impl<T> CommandResult<T> {
    fn with(outcome: Outcome, data: Option<T>) -> Self {
        Self {
            outcome,
            data,
            message: None,
            failure: None,
        }
    }

    pub fn success(data: T) -> Self {
        Self::with(Outcome::Success, Some(data))
    }

    pub fn created(data: T) -> Self {
        Self::with(Outcome::Created, Some(data))
    }

    pub fn updated(data: T) -> Self {
        Self::with(Outcome::Updated, Some(data))
    }

    pub fn no_operation(data: Option<T>) -> Self {
        Self::with(Outcome::NoOperation, data)
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failed,
            data: None,
            message: Some(message.into()),
            failure: Some(kind),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Anything but `Failed`.
    pub fn is_success(&self) -> bool {
        self.outcome != Outcome::Failed
    }

    pub fn is_failed_with(&self, kind: FailureKind) -> bool {
        self.failure == Some(kind)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CommandResult<U> {
        CommandResult {
            outcome: self.outcome,
            data: self.data.map(f),
            message: self.message,
            failure: self.failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let ok = CommandResult::created(1);
        assert!(ok.is_success());
        assert_eq!(ok.data, Some(1));

        let noop: CommandResult<i32> = CommandResult::no_operation(None);
        assert!(noop.is_success());
        assert_eq!(noop.outcome, Outcome::NoOperation);

        let failed: CommandResult<i32> =
            CommandResult::failed(FailureKind::Downgrade, "older than stored");
        assert!(!failed.is_success());
        assert!(failed.is_failed_with(FailureKind::Downgrade));
        assert_eq!(failed.message.as_deref(), Some("older than stored"));
    }

    #[test]
    fn test_map_keeps_outcome() {
        let mapped = CommandResult::updated(2).map(|v| v * 10);
        assert_eq!(mapped.outcome, Outcome::Updated);
        assert_eq!(mapped.data, Some(20));
    }
}
