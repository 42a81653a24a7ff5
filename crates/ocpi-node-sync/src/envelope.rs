//! The OCPI response envelope.

use chrono::{DateTime, Utc};
use serde::Serialize;

use ocpi_node_core::{CommandResult, FailureKind, HttpStatus, Outcome, StatusCode};

use crate::error::HandshakeError;

/// Every response body: payload plus OCPI status, with the HTTP status the
/// transport should use alongside it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcpiResponse<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub status_code: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub http_status: HttpStatus,
}

impl<T> OcpiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            status_code: StatusCode::Success,
            status_message: None,
            timestamp: Utc::now(),
            http_status: HttpStatus::Ok,
        }
    }

    /// A success without body, e.g. after `DELETE`.
    pub fn empty() -> Self {
        Self {
            data: None,
            status_code: StatusCode::Success,
            status_message: None,
            timestamp: Utc::now(),
            http_status: HttpStatus::Ok,
        }
    }

    pub fn error(http_status: HttpStatus, status_code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            data: None,
            status_code,
            status_message: Some(message.into()),
            timestamp: Utc::now(),
            http_status,
        }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        let (http, code) = kind.statuses();
        Self::error(http, code, message)
    }

    pub fn is_success(&self) -> bool {
        self.status_code.is_success()
    }
}

impl<T> From<HandshakeError> for OcpiResponse<T> {
    fn from(error: HandshakeError) -> Self {
        let (http, code) = error.statuses();
        Self::error(http, code, error.to_string())
    }
}

impl<T> From<CommandResult<T>> for OcpiResponse<T> {
    fn from(result: CommandResult<T>) -> Self {
        match (result.outcome, result.failure) {
            (Outcome::Failed, Some(kind)) => {
                Self::failure(kind, result.message.unwrap_or_else(|| kind.to_string()))
            }
            (Outcome::Failed, None) => Self::error(
                HttpStatus::InternalServerError,
                StatusCode::GenericServerError,
                result.message.unwrap_or_default(),
            ),
            (Outcome::Created, _) => {
                let mut response = Self::ok_or_empty(result.data);
                response.http_status = HttpStatus::Created;
                response
            }
            _ => Self::ok_or_empty(result.data),
        }
    }
}

impl<T> OcpiResponse<T> {
    fn ok_or_empty(data: Option<T>) -> Self {
        match data {
            Some(data) => Self::ok(data),
            None => Self::empty(),
        }
    }
}
