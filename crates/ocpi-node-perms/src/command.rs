//! Commands written to the `remote-parties` audit stream.
//!
//! Every write that produces a record logs the full record, so replay is an
//! upsert. Token removal logs only the token and recomputes the prune.

use serde::{Deserialize, Serialize};

use ocpi_node_core::{AccessToken, RemoteParty, RemotePartyId};
use ocpi_node_store::{AuditLogEntry, StoreError};

pub const ADD_REMOTE_PARTY: &str = "addRemoteParty";
pub const ADD_REMOTE_PARTY_IF_NOT_EXISTS: &str = "addRemotePartyIfNotExists";
pub const ADD_OR_UPDATE_REMOTE_PARTY: &str = "addOrUpdateRemoteParty";
pub const UPDATE_REMOTE_PARTY: &str = "updateRemoteParty";
pub const REPLACE_REMOTE_PARTY: &str = "replaceRemoteParty";
pub const SET_ACCESS_STATUS: &str = "setAccessStatus";
pub const SET_PARTY_STATUS: &str = "setPartyStatus";
pub const REMOVE_REMOTE_PARTY: &str = "removeRemoteParty";
pub const REMOVE_ACCESS_TOKEN: &str = "removeAccessToken";

const SNAPSHOT_COMMANDS: [&str; 7] = [
    ADD_REMOTE_PARTY,
    ADD_REMOTE_PARTY_IF_NOT_EXISTS,
    ADD_OR_UPDATE_REMOTE_PARTY,
    UPDATE_REMOTE_PARTY,
    REPLACE_REMOTE_PARTY,
    SET_ACCESS_STATUS,
    SET_PARTY_STATUS,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovePartyPayload {
    pub id: RemotePartyId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveTokenPayload {
    pub remote_party_id: RemotePartyId,
    pub access_token: AccessToken,
}

/// A decoded registry entry.
#[derive(Debug, Clone)]
pub enum RegistryCommand {
    Put(RemoteParty),
    RemoveParty(RemovePartyPayload),
    RemoveToken(RemoveTokenPayload),
}

impl RegistryCommand {
    pub fn parse(entry: &AuditLogEntry) -> Result<Self, StoreError> {
        let command = entry.command.as_str();
        if SNAPSHOT_COMMANDS.contains(&command) {
            return Ok(RegistryCommand::Put(entry.payload_as()?));
        }
        match command {
            REMOVE_REMOTE_PARTY => Ok(RegistryCommand::RemoveParty(entry.payload_as()?)),
            REMOVE_ACCESS_TOKEN => Ok(RegistryCommand::RemoveToken(entry.payload_as()?)),
            other => Err(StoreError::UnknownCommand(other.to_string())),
        }
    }
}
