//! Version and endpoint descriptors published on `/versions`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An OCPI protocol version identifier such as `2.2.1`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(String);

impl VersionId {
    pub const V2_2_1: &'static str = "2.2.1";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn v2_2_1() -> Self {
        Self::new(Self::V2_2_1)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionId({})", self.0)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// OCPI module identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleId {
    Cdrs,
    #[serde(rename = "chargingprofiles")]
    ChargingProfiles,
    Commands,
    Credentials,
    #[serde(rename = "hubclientinfo")]
    HubClientInfo,
    Locations,
    Sessions,
    Tariffs,
    Tokens,
}

impl ModuleId {
    /// The path segment and wire identifier of the module.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleId::Cdrs => "cdrs",
            ModuleId::ChargingProfiles => "chargingprofiles",
            ModuleId::Commands => "commands",
            ModuleId::Credentials => "credentials",
            ModuleId::HubClientInfo => "hubclientinfo",
            ModuleId::Locations => "locations",
            ModuleId::Sessions => "sessions",
            ModuleId::Tariffs => "tariffs",
            ModuleId::Tokens => "tokens",
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a module an endpoint implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InterfaceRole {
    Sender,
    Receiver,
}

/// One entry of the `/versions` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInformation {
    pub version: VersionId,
    pub url: String,
}

/// One module endpoint of a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEndpoint {
    pub identifier: ModuleId,
    pub role: InterfaceRole,
    pub url: String,
}

/// The body of `/versions/{version}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDetails {
    pub version: VersionId,
    pub endpoints: Vec<VersionEndpoint>,
}

impl VersionDetails {
    pub fn endpoint(&self, module: ModuleId, role: InterfaceRole) -> Option<&VersionEndpoint> {
        self.endpoints
            .iter()
            .find(|e| e.identifier == module && e.role == role)
    }

    pub fn has_module(&self, module: ModuleId) -> bool {
        self.endpoints.iter().any(|e| e.identifier == module)
    }
}

/// Join URL path segments without doubling separators.
///
/// Runs of `/` in the path of `base` and in every segment collapse to one,
/// empty parts are skipped, and the scheme separator of `base` is left
/// alone.
pub fn join_url(base: &str, segments: &[&str]) -> String {
    let (mut url, rest) = match base.split_once("://") {
        Some((scheme, rest)) => (format!("{}://", scheme), rest),
        None => (String::new(), base),
    };

    let mut parts = rest
        .split('/')
        .chain(segments.iter().flat_map(|segment| segment.split('/')))
        .filter(|part| !part.is_empty());

    if !url.is_empty() {
        if let Some(authority) = parts.next() {
            url.push_str(authority);
        }
    }
    for part in parts {
        url.push('/');
        url.push_str(part);
    }
    url
}
