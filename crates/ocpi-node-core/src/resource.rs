//! The versioned-resource envelope shared by every synchronized asset.
//!
//! Every resource carries an owner, an id and a `last_updated` timestamp.
//! Writes are only accepted when they are strictly newer than what is
//! stored, unless downgrades are explicitly allowed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::PartyId;

/// The kinds of resources kept in the resource store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Location,
    Tariff,
    Session,
    TokenStatus,
    Cdr,
}

impl ResourceKind {
    /// Noun used in audit command names, e.g. `addOrUpdateLocation`.
    pub fn noun(&self) -> &'static str {
        match self {
            ResourceKind::Location => "Location",
            ResourceKind::Tariff => "Tariff",
            ResourceKind::Session => "Session",
            ResourceKind::TokenStatus => "TokenStatus",
            ResourceKind::Cdr => "CDR",
        }
    }

    /// Plural noun used for bulk commands, e.g. `removeAllLocations`.
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Location => "Locations",
            ResourceKind::Tariff => "Tariffs",
            ResourceKind::Session => "Sessions",
            ResourceKind::TokenStatus => "TokenStatuses",
            ResourceKind::Cdr => "CDRs",
        }
    }

    /// Whether lookups may fall through to slow storage.
    pub fn is_archived(&self) -> bool {
        matches!(self, ResourceKind::Session | ResourceKind::Cdr)
    }

    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Location,
        ResourceKind::Tariff,
        ResourceKind::Session,
        ResourceKind::TokenStatus,
        ResourceKind::Cdr,
    ];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.noun())
    }
}

/// A resource with identity, ownership and a monotonic timestamp.
pub trait Resource:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: ResourceKind;

    fn id(&self) -> &str;

    /// The local party owning this resource.
    fn owner(&self) -> PartyId;

    fn last_updated(&self) -> DateTime<Utc>;

    fn set_last_updated(&mut self, at: DateTime<Utc>);

    /// Revision counter, bumped on structural sub-resource changes.
    fn version_id(&self) -> u64;

    fn set_version_id(&mut self, version_id: u64);
}

/// The downgrade rule: a write is rejected when downgrades are not allowed
/// and the incoming timestamp is not strictly newer than the stored one.
pub fn allows_write(
    existing: DateTime<Utc>,
    incoming: DateTime<Utc>,
    allow_downgrades: bool,
) -> bool {
    allow_downgrades || incoming > existing
}

/// Resolve the downgrade policy: request override, then party, then node.
pub fn effective_allow_downgrades(
    request: Option<bool>,
    party: Option<bool>,
    node_default: bool,
) -> bool {
    request.or(party).unwrap_or(node_default)
}
