//! Audit commands written by the resource store and read back on replay.
//!
//! Writes log the full resulting snapshot so replay is an unconditional
//! upsert. Command names follow `{verb}{Noun}`, e.g. `addOrUpdateLocation`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ocpi_node_core::{LocalParty, PartyId, ResourceKind};

use crate::error::{Result, StoreError};
use crate::traits::AuditLogEntry;

pub const ADD_PARTY: &str = "addParty";
pub const REMOVE_PARTY: &str = "removeParty";

/// How a snapshot write was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteVerb {
    Add,
    AddOrUpdate,
    Update,
}

impl WriteVerb {
    const ALL: [WriteVerb; 3] = [WriteVerb::Add, WriteVerb::AddOrUpdate, WriteVerb::Update];

    fn prefix(&self) -> &'static str {
        match self {
            WriteVerb::Add => "add",
            WriteVerb::AddOrUpdate => "addOrUpdate",
            WriteVerb::Update => "update",
        }
    }

    pub fn command(&self, kind: ResourceKind) -> String {
        format!("{}{}", self.prefix(), kind.noun())
    }
}

pub fn remove_command(kind: ResourceKind) -> String {
    format!("remove{}", kind.noun())
}

pub fn remove_all_command(kind: ResourceKind) -> String {
    format!("removeAll{}", kind.plural())
}

/// Payload of a single removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceKey {
    pub country_code: String,
    pub party_id: String,
    pub id: String,
}

impl ResourceKey {
    pub fn new(party: &PartyId, id: &str) -> Self {
        Self {
            country_code: party.country_code.clone(),
            party_id: party.party_id.clone(),
            id: id.to_string(),
        }
    }

    pub fn party(&self) -> PartyId {
        PartyId {
            country_code: self.country_code.clone(),
            party_id: self.party_id.clone(),
        }
    }
}

/// Payload of a bulk removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRemoval {
    pub country_code: String,
    pub party_id: String,
    pub ids: Vec<String>,
}

impl BulkRemoval {
    pub fn party(&self) -> PartyId {
        PartyId {
            country_code: self.country_code.clone(),
            party_id: self.party_id.clone(),
        }
    }
}

/// A decoded asset-stream entry.
#[derive(Debug, Clone)]
pub enum AssetCommand {
    AddParty(LocalParty),
    RemoveParty(PartyId),
    Put {
        kind: ResourceKind,
        verb: WriteVerb,
        snapshot: Value,
    },
    Remove {
        kind: ResourceKind,
        key: ResourceKey,
    },
    RemoveAll {
        kind: ResourceKind,
        removal: BulkRemoval,
    },
}

impl AssetCommand {
    pub fn parse(entry: &AuditLogEntry) -> Result<Self> {
        let command = entry.command.as_str();

        if command == ADD_PARTY {
            return Ok(AssetCommand::AddParty(entry.payload_as()?));
        }
        if command == REMOVE_PARTY {
            return Ok(AssetCommand::RemoveParty(entry.payload_as()?));
        }

        for kind in ResourceKind::ALL {
            for verb in WriteVerb::ALL {
                if command == verb.command(kind) {
                    let snapshot = entry.payload.clone().ok_or_else(|| {
                        StoreError::InvalidData(format!("{} without payload", command))
                    })?;
                    return Ok(AssetCommand::Put {
                        kind,
                        verb,
                        snapshot,
                    });
                }
            }
            if command == remove_command(kind) {
                return Ok(AssetCommand::Remove {
                    kind,
                    key: entry.payload_as()?,
                });
            }
            if command == remove_all_command(kind) {
                return Ok(AssetCommand::RemoveAll {
                    kind,
                    removal: entry.payload_as()?,
                });
            }
        }

        Err(StoreError::UnknownCommand(entry.command.clone()))
    }
}
