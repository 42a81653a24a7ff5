//! Error types for the sync module.

use thiserror::Error;

use ocpi_node_core::{FailureKind, HttpStatus, StatusCode, ValidationError, VersionId};

/// Errors from outbound calls to a peer.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Nothing answered at the URL.
    #[error("peer unreachable: {0}")]
    Unreachable(String),

    /// The call did not finish in time.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The peer refused our token.
    #[error("peer rejected our token")]
    Unauthorized,

    /// The peer answered with an error status.
    #[error("peer answered {http_status}: {message}")]
    Status { http_status: u16, message: String },

    /// The peer answered with a body we could not use.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors ending a credentials request.
///
/// Each variant maps to one HTTP status and OCPI status code, see
/// [`HandshakeError::statuses`].
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The request carried no token at all.
    #[error("missing token")]
    MissingToken,

    /// A token we never issued, or one that may not be used. Both read the
    /// same so a caller cannot probe for existing tokens.
    #[error("invalid or blocked token")]
    InvalidToken,

    /// `POST` from a peer that already completed registration.
    #[error("already registered, use PUT to update credentials")]
    AlreadyRegistered,

    /// `PUT` or `DELETE` from a peer that never registered.
    #[error("not registered, use POST to register")]
    NotRegistered,

    /// The credentials body is malformed.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(#[from] ValidationError),

    /// The peer's versions endpoint failed.
    #[error("fetching versions from {url} failed: {reason}")]
    ListVersions { url: String, reason: String },

    /// The peer does not offer the version being registered.
    #[error("peer at {url} does not support version {version}")]
    NoCommonVersion { url: String, version: VersionId },

    /// The peer's version details failed or lack a credentials endpoint.
    #[error("fetching version details from {url} failed: {reason}")]
    VersionDetails { url: String, reason: String },

    /// `PUT` tried to change the set of roles.
    #[error("roles may not change on re-registration")]
    RoleMismatch,

    /// The request path names a version this node does not serve.
    #[error("unsupported version {0}")]
    UnsupportedVersion(VersionId),

    /// The registry refused the final write.
    #[error("{kind}: {message}")]
    Rejected { kind: FailureKind, message: String },

    /// Persistence failed.
    #[error("registry error: {0}")]
    Registry(#[from] ocpi_node_perms::RegistryError),
}

impl HandshakeError {
    pub fn statuses(&self) -> (HttpStatus, StatusCode) {
        match self {
            HandshakeError::MissingToken => (HttpStatus::BadRequest, StatusCode::GenericClientError),
            HandshakeError::InvalidToken => (HttpStatus::Forbidden, StatusCode::GenericClientError),
            HandshakeError::AlreadyRegistered | HandshakeError::NotRegistered => {
                (HttpStatus::MethodNotAllowed, StatusCode::GenericClientError)
            }
            HandshakeError::InvalidCredentials(_) => {
                (HttpStatus::BadRequest, StatusCode::InvalidOrMissingParameters)
            }
            HandshakeError::ListVersions { .. } => {
                (HttpStatus::MethodNotAllowed, StatusCode::UnableToUseClientApi)
            }
            HandshakeError::NoCommonVersion { .. } => {
                (HttpStatus::MethodNotAllowed, StatusCode::UnsupportedVersion)
            }
            HandshakeError::VersionDetails { .. } => {
                (HttpStatus::MethodNotAllowed, StatusCode::NoMatchingEndpoints)
            }
            HandshakeError::RoleMismatch => FailureKind::RoleMismatch.statuses(),
            HandshakeError::UnsupportedVersion(_) => {
                (HttpStatus::NotFound, StatusCode::UnsupportedVersion)
            }
            HandshakeError::Rejected { kind, .. } => kind.statuses(),
            HandshakeError::Registry(_) => {
                (HttpStatus::InternalServerError, StatusCode::GenericServerError)
            }
        }
    }
}

/// Result type for handshake operations.
pub type Result<T> = std::result::Result<T, HandshakeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_failures_are_method_not_allowed() {
        let list = HandshakeError::ListVersions {
            url: "https://peer/versions".into(),
            reason: "timeout".into(),
        };
        assert_eq!(list.statuses(), (HttpStatus::MethodNotAllowed, StatusCode::UnableToUseClientApi));

        let details = HandshakeError::VersionDetails {
            url: "https://peer/2.2.1".into(),
            reason: "no credentials endpoint".into(),
        };
        assert_eq!(details.statuses().1.code(), 3003);
    }

    #[test]
    fn test_token_errors() {
        assert_eq!(
            HandshakeError::InvalidToken.statuses(),
            (HttpStatus::Forbidden, StatusCode::GenericClientError)
        );
        assert_eq!(HandshakeError::MissingToken.statuses().0, HttpStatus::BadRequest);
    }

    #[test]
    fn test_validation_maps_to_2001() {
        let err = HandshakeError::from(ValidationError::MissingField("token"));
        assert_eq!(err.statuses(), (HttpStatus::BadRequest, StatusCode::InvalidOrMissingParameters));
    }
}
