//! Version and endpoint publishing.
//!
//! `/versions` lists what this node speaks; `/versions/{id}` lists the
//! modules a particular caller may use. The module set depends on who is
//! asking: a CPO peer sees our eMSP interfaces, an eMSP peer sees our CPO
//! interfaces, and an anonymous caller sees open data at most.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use ocpi_node_core::{
    join_url, InterfaceRole, LocalAccessInfo, ModuleId, RemoteParty, Role, VersionDetails,
    VersionEndpoint, VersionId, VersionInformation,
};

/// Modules published to unauthenticated callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenDataConfig {
    pub locations: bool,
    pub tariffs: bool,
}

impl OpenDataConfig {
    pub fn with_locations(mut self, enabled: bool) -> Self {
        self.locations = enabled;
        self
    }

    pub fn with_tariffs(mut self, enabled: bool) -> Self {
        self.tariffs = enabled;
        self
    }
}

/// Who is asking.
#[derive(Debug, Clone)]
pub enum Caller {
    Anonymous,
    Peer {
        party: Arc<RemoteParty>,
        access: LocalAccessInfo,
    },
}

impl Caller {
    /// Whether the caller may see module endpoints beyond credentials.
    fn trusted_roles(&self) -> Vec<Role> {
        match self {
            Caller::Anonymous => Vec::new(),
            Caller::Peer { party, access } => {
                if !access.is_usable_at(Utc::now()) || !party.is_enabled() {
                    return Vec::new();
                }
                let mut roles: Vec<Role> = party.roles.iter().map(|r| r.role).collect();
                roles.sort();
                roles.dedup();
                roles
            }
        }
    }
}

const CPO_FACING: [(ModuleId, InterfaceRole); 7] = [
    (ModuleId::Locations, InterfaceRole::Receiver),
    (ModuleId::Tariffs, InterfaceRole::Receiver),
    (ModuleId::Sessions, InterfaceRole::Receiver),
    (ModuleId::Cdrs, InterfaceRole::Receiver),
    (ModuleId::Tokens, InterfaceRole::Receiver),
    (ModuleId::Commands, InterfaceRole::Sender),
    (ModuleId::ChargingProfiles, InterfaceRole::Sender),
];

const EMSP_FACING: [(ModuleId, InterfaceRole); 7] = [
    (ModuleId::Locations, InterfaceRole::Sender),
    (ModuleId::Tariffs, InterfaceRole::Sender),
    (ModuleId::Sessions, InterfaceRole::Sender),
    (ModuleId::Cdrs, InterfaceRole::Sender),
    (ModuleId::ChargingProfiles, InterfaceRole::Sender),
    (ModuleId::Commands, InterfaceRole::Receiver),
    (ModuleId::Tokens, InterfaceRole::Receiver),
];

/// Builds the `/versions` documents.
#[derive(Debug, Clone)]
pub struct VersionPublisher {
    base_url: String,
    versions: Vec<VersionId>,
    open_data: OpenDataConfig,
}

impl VersionPublisher {
    pub fn new(base_url: impl Into<String>, versions: Vec<VersionId>, open_data: OpenDataConfig) -> Self {
        Self {
            base_url: base_url.into(),
            versions,
            open_data,
        }
    }

    /// This node's versions URL, handed to peers in credentials.
    pub fn versions_url(&self) -> String {
        join_url(&self.base_url, &["versions"])
    }

    pub fn supports(&self, version: &VersionId) -> bool {
        self.versions.contains(version)
    }

    pub fn versions(&self) -> Vec<VersionInformation> {
        self.versions
            .iter()
            .map(|version| VersionInformation {
                version: version.clone(),
                url: join_url(&self.base_url, &["versions", version.as_str()]),
            })
            .collect()
    }

    /// Endpoints of `version` visible to `caller`, or `None` if the version
    /// is not served. `hosts_cpo` tells whether a local CPO party exists.
    pub fn version_details(
        &self,
        version: &VersionId,
        caller: &Caller,
        hosts_cpo: bool,
    ) -> Option<VersionDetails> {
        if !self.supports(version) {
            return None;
        }

        // One endpoint per (module, role); the first side to claim it keeps it.
        let mut modules: BTreeMap<(ModuleId, InterfaceRole), &'static str> = BTreeMap::new();
        let mut publish = |facing: &[(ModuleId, InterfaceRole)], side: &'static str| {
            for key in facing {
                modules.entry(*key).or_insert(side);
            }
        };

        // Every caller, registered or not, can negotiate credentials.
        publish(
            &[
                (ModuleId::Credentials, InterfaceRole::Sender),
                (ModuleId::Credentials, InterfaceRole::Receiver),
            ][..],
            "",
        );

        match caller {
            Caller::Anonymous => {
                if hosts_cpo && self.open_data.locations {
                    publish(&[(ModuleId::Locations, InterfaceRole::Sender)][..], "cpo");
                }
                if hosts_cpo && self.open_data.tariffs {
                    publish(&[(ModuleId::Tariffs, InterfaceRole::Sender)][..], "cpo");
                }
            }
            Caller::Peer { .. } => {
                for role in caller.trusted_roles() {
                    match role {
                        Role::Cpo => publish(&CPO_FACING[..], "emsp"),
                        Role::Emsp => publish(&EMSP_FACING[..], "cpo"),
                        _ => {}
                    }
                }
            }
        }

        let endpoints = modules
            .into_iter()
            .map(|((identifier, role), side)| VersionEndpoint {
                identifier,
                role,
                url: join_url(&self.base_url, &[version.as_str(), side, identifier.as_str()]),
            })
            .collect();

        Some(VersionDetails {
            version: version.clone(),
            endpoints,
        })
    }
}
