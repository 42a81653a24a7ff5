//! Strong type definitions for the OCPI node.
//!
//! Identifiers and tokens are newtypes so that a party id can never be
//! passed where an access token is expected.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The identity of an OCPI party: ISO-3166 alpha-2 country code plus a
/// three character party id, e.g. `DE*ABC`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartyId {
    pub country_code: String,
    pub party_id: String,
}

impl PartyId {
    /// Create a validated party identity. Both parts are upper-cased.
    pub fn new(country_code: &str, party_id: &str) -> Result<Self, ValidationError> {
        let country_code = country_code.trim().to_ascii_uppercase();
        let party_id = party_id.trim().to_ascii_uppercase();

        if country_code.len() != 2 || !country_code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::InvalidCountryCode(country_code));
        }
        if party_id.len() != 3 || !party_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidPartyId(party_id));
        }

        Ok(Self {
            country_code,
            party_id,
        })
    }
}

impl fmt::Debug for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartyId({}*{})", self.country_code, self.party_id)
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*{}", self.country_code, self.party_id)
    }
}

/// OCPI 2.2.1 party roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Cpo,
    Emsp,
    Hub,
    Nap,
    Nsp,
    Other,
    Scsp,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Cpo => "CPO",
            Role::Emsp => "EMSP",
            Role::Hub => "HUB",
            Role::Nap => "NAP",
            Role::Nsp => "NSP",
            Role::Other => "OTHER",
            Role::Scsp => "SCSP",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CPO" => Ok(Role::Cpo),
            "EMSP" => Ok(Role::Emsp),
            "HUB" => Ok(Role::Hub),
            "NAP" => Ok(Role::Nap),
            "NSP" => Ok(Role::Nsp),
            "OTHER" => Ok(Role::Other),
            "SCSP" => Ok(Role::Scsp),
            _ => Err(ValidationError::UnknownRole(s.to_string())),
        }
    }
}

/// Stable identifier of a remote party relationship in the registry.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemotePartyId(String);

impl RemotePartyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive the id from the party's identity and primary role, e.g. `DE*ABC*CPO`.
    pub fn derive(party: &PartyId, role: Role) -> Self {
        Self(format!("{}*{}", party, role))
    }

    /// A fresh id for a party whose identity is not known yet.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RemotePartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemotePartyId({})", self.0)
    }
}

impl fmt::Display for RemotePartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque bearer credential exchanged with a peer.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Number of random bytes in a minted token.
    pub const LENGTH: usize = 32;

    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Mint a fresh random token.
    pub fn generate() -> Self {
        let mut bytes = [0u8; Self::LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "AccessToken({}…)", prefix)
    }
}

/// Whether a locally issued access token may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessStatus {
    Allowed,
    Blocked,
}

/// Reachability of a peer's API as last observed by this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RemoteAccessStatus {
    Unknown,
    Online,
    Offline,
}

/// Whether the relationship with a remote party is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartyStatus {
    Enabled,
    Disabled,
}

/// Correlates a request with the audit entries it produced.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTrackingId(String);

impl EventTrackingId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventTrackingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventTrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventTrackingId({})", self.0)
    }
}

impl fmt::Display for EventTrackingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
