//! OCPI application status codes and the transport status paired with them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::result::FailureKind;

/// OCPI `status_code` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
pub enum StatusCode {
    Success,
    GenericClientError,
    InvalidOrMissingParameters,
    NotEnoughInformation,
    UnknownLocation,
    UnknownToken,
    GenericServerError,
    UnableToUseClientApi,
    UnsupportedVersion,
    NoMatchingEndpoints,
}

impl StatusCode {
    pub fn code(&self) -> u16 {
        match self {
            StatusCode::Success => 1000,
            StatusCode::GenericClientError => 2000,
            StatusCode::InvalidOrMissingParameters => 2001,
            StatusCode::NotEnoughInformation => 2002,
            StatusCode::UnknownLocation => 2003,
            StatusCode::UnknownToken => 2004,
            StatusCode::GenericServerError => 3000,
            StatusCode::UnableToUseClientApi => 3001,
            StatusCode::UnsupportedVersion => 3002,
            StatusCode::NoMatchingEndpoints => 3003,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1000 => StatusCode::Success,
            2000 => StatusCode::GenericClientError,
            2001 => StatusCode::InvalidOrMissingParameters,
            2002 => StatusCode::NotEnoughInformation,
            2003 => StatusCode::UnknownLocation,
            2004 => StatusCode::UnknownToken,
            3000 => StatusCode::GenericServerError,
            3001 => StatusCode::UnableToUseClientApi,
            3002 => StatusCode::UnsupportedVersion,
            3003 => StatusCode::NoMatchingEndpoints,
            _ => return None,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StatusCode::Success)
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.code()
    }
}

impl TryFrom<u16> for StatusCode {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        StatusCode::from_code(code).ok_or_else(|| format!("unknown OCPI status code {}", code))
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// HTTP status the transport layer must answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpStatus {
    Ok,
    Created,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    MethodNotAllowed,
    RequestTimeout,
    Conflict,
    InternalServerError,
}

impl HttpStatus {
    pub fn as_u16(&self) -> u16 {
        match self {
            HttpStatus::Ok => 200,
            HttpStatus::Created => 201,
            HttpStatus::BadRequest => 400,
            HttpStatus::Unauthorized => 401,
            HttpStatus::Forbidden => 403,
            HttpStatus::NotFound => 404,
            HttpStatus::MethodNotAllowed => 405,
            HttpStatus::RequestTimeout => 408,
            HttpStatus::Conflict => 409,
            HttpStatus::InternalServerError => 500,
        }
    }
}

impl FailureKind {
    /// Wire statuses for a failed command.
    pub fn statuses(&self) -> (HttpStatus, StatusCode) {
        match self {
            FailureKind::Validation => (HttpStatus::BadRequest, StatusCode::InvalidOrMissingParameters),
            FailureKind::NotFound => (HttpStatus::NotFound, StatusCode::GenericClientError),
            FailureKind::AlreadyExists
            | FailureKind::Downgrade
            | FailureKind::ConcurrentUpdate => (HttpStatus::Conflict, StatusCode::GenericClientError),
            FailureKind::RoleMismatch => (HttpStatus::BadRequest, StatusCode::GenericClientError),
            FailureKind::Unauthorized => (HttpStatus::Forbidden, StatusCode::GenericClientError),
        }
    }
}
