//! Error types for the OCPI node core.

use thiserror::Error;

/// Core errors raised while encoding or decoding node values.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

/// Validation errors for incoming values and patches.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid country code {0:?}: expected two ASCII letters")]
    InvalidCountryCode(String),

    #[error("invalid party id {0:?}: expected three ASCII alphanumerics")]
    InvalidPartyId(String),

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("patch is empty")]
    EmptyPatch,

    #[error("patch must be a JSON object")]
    InvalidPatch,

    #[error("field {0} cannot be changed by a patch")]
    ImmutableField(&'static str),

    #[error("patched value is not a valid {kind}: {reason}")]
    PatchedValueInvalid { kind: &'static str, reason: String },

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::EncodingError(msg)
            | CoreError::DecodingError(msg)
            | CoreError::InvalidIdentifier(msg) => ValidationError::PatchedValueInvalid {
                kind: "value",
                reason: msg,
            },
        }
    }
}
