//! # OCPI Node Core
//!
//! Pure value types for an OCPI peer-sync node: party identities, access
//! tokens, credentials, version descriptors and the versioned resources
//! synchronized between parties.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`RemoteParty`] - A peer with its roles, local and remote access infos
//! - [`Credentials`] - The object exchanged during registration
//! - [`VersionDetails`] - Module endpoints published for one protocol version
//! - [`Resource`] - The identity/timestamp/revision envelope of synchronized assets
//! - [`Location`], [`Tariff`], [`Session`], [`TokenStatus`], [`Cdr`] - The assets
//! - [`CommandResult`] - Outcome of a registry or store command
//!
//! ## Downgrade Prevention
//!
//! A write replaces a stored resource only if its `last_updated` is strictly
//! newer, unless downgrades are allowed. See [`allows_write`].
//!
//! ## Canonicalization
//!
//! State digests hash deterministic CBOR. See [`canonical`] module.

pub mod access;
pub mod canonical;
pub mod credentials;
pub mod error;
pub mod location;
pub mod patch;
pub mod records;
pub mod resource;
pub mod result;
pub mod status;
pub mod types;
pub mod version;

pub use access::{LocalAccessInfo, RemoteAccessInfo, RemoteParty};
pub use canonical::{canonical_bytes, DigestBuilder, StateDigest};
pub use credentials::{BusinessDetails, Credentials, CredentialsRole, LocalParty};
pub use error::{CoreError, ValidationError};
pub use location::{ChargingStation, Connector, Evse, Location};
pub use patch::{apply_patch, merge_patch, patch_value, validate_patch};
pub use records::{Cdr, Session, Tariff, TokenStatus};
pub use resource::{allows_write, effective_allow_downgrades, Resource, ResourceKind};
pub use result::{CommandResult, FailureKind, Outcome};
pub use status::{HttpStatus, StatusCode};
pub use types::{
    AccessStatus, AccessToken, EventTrackingId, PartyId, PartyStatus, RemoteAccessStatus,
    RemotePartyId, Role,
};
pub use version::{
    join_url, InterfaceRole, ModuleId, VersionDetails, VersionEndpoint, VersionId,
    VersionInformation,
};
