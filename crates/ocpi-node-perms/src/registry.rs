//! The remote-party registry.
//!
//! Holds every peer this node trusts, indexed by id and resolvable by the
//! tokens we issued to it. Records are immutable `Arc` snapshots; writes
//! compare-and-swap the whole record after logging it to the
//! `remote-parties` stream.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use ocpi_node_core::{
    AccessStatus, AccessToken, CommandResult, DigestBuilder, FailureKind, LocalAccessInfo,
    PartyStatus, RemoteParty, RemotePartyId,
};
use ocpi_node_store::{AuditLog, AuditLogEntry, Journal, LogStream, WriteContext};

use crate::command::{
    RegistryCommand, RemovePartyPayload, RemoveTokenPayload, ADD_OR_UPDATE_REMOTE_PARTY,
    ADD_REMOTE_PARTY, ADD_REMOTE_PARTY_IF_NOT_EXISTS, REMOVE_ACCESS_TOKEN, REMOVE_REMOTE_PARTY,
    REPLACE_REMOTE_PARTY, SET_ACCESS_STATUS, SET_PARTY_STATUS, UPDATE_REMOTE_PARTY,
};
use crate::error::Result;

type PartyMap = RwLock<HashMap<RemotePartyId, Arc<RemoteParty>>>;

const RETRY_MESSAGE: &str = "update failed, please retry";

/// Checks a record against the map before it is written.
///
/// `expected` is the record being replaced, `None` for an insert.
fn check_put(
    map: &HashMap<RemotePartyId, Arc<RemoteParty>>,
    expected: Option<&Arc<RemoteParty>>,
    next: &RemoteParty,
) -> std::result::Result<(), (FailureKind, String)> {
    let is_current = match (map.get(&next.id), expected) {
        (None, None) => true,
        (Some(stored), Some(expected)) => Arc::ptr_eq(stored, expected),
        _ => false,
    };
    if !is_current {
        return Err((FailureKind::ConcurrentUpdate, RETRY_MESSAGE.to_string()));
    }

    for token in next.local_tokens() {
        let taken = map
            .values()
            .any(|other| other.id != next.id && other.local_access_info(token).is_some());
        if taken {
            return Err((
                FailureKind::AlreadyExists,
                format!("access token {:?} is already in use", token),
            ));
        }
    }

    Ok(())
}

fn validate(party: &RemoteParty) -> Option<CommandResult<Arc<RemoteParty>>> {
    if party.local_access_infos.is_empty() {
        return Some(CommandResult::failed(
            FailureKind::Validation,
            format!("remote party {} has no local access info", party.id),
        ));
    }
    None
}

/// The registry of remote parties.
pub struct RemotePartyRegistry {
    parties: Arc<PartyMap>,
    journal: Journal,
}

impl RemotePartyRegistry {
    pub fn new(log: Arc<dyn AuditLog>) -> Self {
        Self {
            parties: Arc::new(RwLock::new(HashMap::new())),
            journal: Journal::new(log, LogStream::RemoteParties),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve a token we issued. Returns a match only if exactly one
    /// party holds the token.
    pub fn try_get_local_access_info(
        &self,
        token: &AccessToken,
    ) -> Option<(Arc<RemoteParty>, LocalAccessInfo)> {
        let parties = self.parties.read();
        let mut matches = parties
            .values()
            .filter_map(|party| party.local_access_info(token).map(|info| (party, info)));

        let (party, info) = matches.next()?;
        if matches.next().is_some() {
            tracing::warn!(token = ?token, "access token held by more than one remote party");
            return None;
        }
        Some((Arc::clone(party), info.clone()))
    }

    pub fn get(&self, id: &RemotePartyId) -> Option<Arc<RemoteParty>> {
        self.parties.read().get(id).cloned()
    }

    /// All parties, sorted by id.
    pub fn list(&self) -> Vec<Arc<RemoteParty>> {
        let mut parties: Vec<Arc<RemoteParty>> = self.parties.read().values().cloned().collect();
        parties.sort_by(|a, b| a.id.cmp(&b.id));
        parties
    }

    pub fn len(&self) -> usize {
        self.parties.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.parties.read().is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn add_remote_party(
        &self,
        party: RemoteParty,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Arc<RemoteParty>>> {
        if let Some(invalid) = validate(&party) {
            return Ok(invalid);
        }
        if self.get(&party.id).is_some() {
            return Ok(CommandResult::failed(
                FailureKind::AlreadyExists,
                format!("remote party {} already exists", party.id),
            ));
        }
        self.commit(ADD_REMOTE_PARTY, None, Some(party), ctx).await
    }

    pub async fn add_remote_party_if_not_exists(
        &self,
        party: RemoteParty,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Arc<RemoteParty>>> {
        if let Some(invalid) = validate(&party) {
            return Ok(invalid);
        }
        if let Some(existing) = self.get(&party.id) {
            return Ok(CommandResult::no_operation(Some(existing)));
        }
        self.commit(ADD_REMOTE_PARTY_IF_NOT_EXISTS, None, Some(party), ctx)
            .await
    }

    pub async fn add_or_update_remote_party(
        &self,
        party: RemoteParty,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Arc<RemoteParty>>> {
        if let Some(invalid) = validate(&party) {
            return Ok(invalid);
        }
        let existing = self.get(&party.id);
        self.commit(ADD_OR_UPDATE_REMOTE_PARTY, existing, Some(party), ctx)
            .await
    }

    pub async fn update_remote_party(
        &self,
        party: RemoteParty,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Arc<RemoteParty>>> {
        if let Some(invalid) = validate(&party) {
            return Ok(invalid);
        }
        let Some(existing) = self.get(&party.id) else {
            return Ok(CommandResult::failed(
                FailureKind::NotFound,
                format!("remote party {} not found", party.id),
            ));
        };
        self.commit(UPDATE_REMOTE_PARTY, Some(existing), Some(party), ctx)
            .await
    }

    /// Replace `expected` with `next` only if `expected` is still the stored record.
    pub async fn replace_remote_party(
        &self,
        expected: &Arc<RemoteParty>,
        next: RemoteParty,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Arc<RemoteParty>>> {
        if let Some(invalid) = validate(&next) {
            return Ok(invalid);
        }
        self.commit(REPLACE_REMOTE_PARTY, Some(Arc::clone(expected)), Some(next), ctx)
            .await
    }

    pub async fn remove_remote_party(
        &self,
        id: &RemotePartyId,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Arc<RemoteParty>>> {
        let Some(existing) = self.get(id) else {
            return Ok(CommandResult::failed(
                FailureKind::NotFound,
                format!("remote party {} not found", id),
            ));
        };
        let entry = AuditLogEntry::new(
            REMOVE_REMOTE_PARTY,
            Some(&RemovePartyPayload { id: id.clone() }),
            ctx,
        )?;
        self.commit_entry(entry, Some(existing), None).await
    }

    /// Revoke one local token. The party goes with its last token.
    pub async fn remove_access_token(
        &self,
        token: &AccessToken,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Arc<RemoteParty>>> {
        let Some((existing, _)) = self.try_get_local_access_info(token) else {
            return Ok(CommandResult::failed(FailureKind::NotFound, "unknown access token"));
        };

        let next = existing.without_local_token(token);
        let entry = AuditLogEntry::new(
            REMOVE_ACCESS_TOKEN,
            Some(&RemoveTokenPayload {
                remote_party_id: existing.id.clone(),
                access_token: token.clone(),
            }),
            ctx,
        )?;

        if next.is_none() {
            tracing::info!(remote_party = %existing.id, "last access token removed, dropping remote party");
        }
        self.commit_entry(entry, Some(existing), next).await
    }

    /// Block or re-allow one local token.
    pub async fn set_access_status(
        &self,
        token: &AccessToken,
        status: AccessStatus,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Arc<RemoteParty>>> {
        let Some((existing, info)) = self.try_get_local_access_info(token) else {
            return Ok(CommandResult::failed(FailureKind::NotFound, "unknown access token"));
        };
        if info.status == status {
            return Ok(CommandResult::no_operation(Some(existing)));
        }
        let Some(next) = existing.with_access_status(token, status) else {
            return Ok(CommandResult::failed(FailureKind::NotFound, "unknown access token"));
        };
        self.commit(SET_ACCESS_STATUS, Some(existing), Some(next), ctx)
            .await
    }

    pub async fn set_party_status(
        &self,
        id: &RemotePartyId,
        status: PartyStatus,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Arc<RemoteParty>>> {
        let Some(existing) = self.get(id) else {
            return Ok(CommandResult::failed(
                FailureKind::NotFound,
                format!("remote party {} not found", id),
            ));
        };
        if existing.status == status {
            return Ok(CommandResult::no_operation(Some(existing)));
        }
        let next = (*existing).clone().with_status(status);
        self.commit(SET_PARTY_STATUS, Some(existing), Some(next), ctx)
            .await
    }

    /// Log the resulting record under `command` and commit it.
    async fn commit(
        &self,
        command: &'static str,
        expected: Option<Arc<RemoteParty>>,
        next: Option<RemoteParty>,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Arc<RemoteParty>>> {
        let entry = AuditLogEntry::new(command, next.as_ref(), ctx)?;
        self.commit_entry(entry, expected, next).await
    }

    /// Replace `expected` by `next` (`None` deletes) if nothing changed meanwhile.
    async fn commit_entry(
        &self,
        entry: AuditLogEntry,
        expected: Option<Arc<RemoteParty>>,
        next: Option<RemoteParty>,
    ) -> Result<CommandResult<Arc<RemoteParty>>> {
        let created = expected.is_none();
        let removed = expected.clone();
        let command = entry.command.clone();
        let next = next.map(Arc::new);
        let parties = Arc::clone(&self.parties);

        let outcome = self
            .journal
            .commit(
                {
                    let parties = Arc::clone(&parties);
                    move || {
                        let map = parties.read();
                        match (&next, &expected) {
                            (Some(next), _) => check_put(&map, expected.as_ref(), next)?,
                            (None, Some(expected)) => {
                                let current = map.get(&expected.id).map_or(false, |s| Arc::ptr_eq(s, expected));
                                if !current {
                                    return Err((FailureKind::ConcurrentUpdate, RETRY_MESSAGE.to_string()));
                                }
                            }
                            (None, None) => {
                                return Err((FailureKind::NotFound, "nothing to change".to_string()));
                            }
                        }
                        drop(map);
                        Ok((entry, (expected, next)))
                    }
                },
                move |(expected, next)| {
                    let mut map = parties.write();
                    match (&next, expected) {
                        (Some(next), _) => {
                            map.insert(next.id.clone(), Arc::clone(next));
                        }
                        (None, Some(expected)) => {
                            map.remove(&expected.id);
                        }
                        (None, None) => {}
                    }
                    next
                },
            )
            .await?;

        match outcome {
            Ok(Some(record)) => {
                tracing::debug!(command = %command, remote_party = %record.id, "registry updated");
                Ok(if created {
                    CommandResult::created(record)
                } else {
                    CommandResult::updated(record)
                })
            }
            Ok(None) => match removed {
                Some(record) => {
                    tracing::info!(command = %command, remote_party = %record.id, "remote party removed");
                    Ok(CommandResult::success(record))
                }
                None => Ok(CommandResult::no_operation(None)),
            },
            Err((kind, message)) => {
                tracing::warn!(command = %command, failure = %kind, message = %message, "registry write rejected");
                Ok(CommandResult::failed(kind, message))
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Replay and snapshots
    // ─────────────────────────────────────────────────────────────────────────

    /// Rebuild from the `remote-parties` stream. No checks, no logging.
    pub fn replay(&self, entries: &[AuditLogEntry]) -> Result<usize> {
        let mut map = self.parties.write();
        for entry in entries {
            match RegistryCommand::parse(entry)? {
                RegistryCommand::Put(party) => {
                    map.insert(party.id.clone(), Arc::new(party));
                }
                RegistryCommand::RemoveParty(payload) => {
                    map.remove(&payload.id);
                }
                RegistryCommand::RemoveToken(payload) => {
                    let pruned = map
                        .get(&payload.remote_party_id)
                        .map(|party| party.without_local_token(&payload.access_token));
                    match pruned {
                        Some(Some(next)) => {
                            map.insert(next.id.clone(), Arc::new(next));
                        }
                        Some(None) => {
                            map.remove(&payload.remote_party_id);
                        }
                        None => {
                            tracing::warn!(remote_party = %payload.remote_party_id, "token removal for unknown remote party skipped");
                        }
                    }
                }
            }
        }
        tracing::debug!(entries = entries.len(), parties = map.len(), "remote party log replayed");
        Ok(entries.len())
    }

    /// Owned records sorted by id.
    pub fn snapshot(&self) -> Vec<RemoteParty> {
        self.list().iter().map(|party| (**party).clone()).collect()
    }

    /// Feed the registry state into a digest.
    pub fn digest_into(&self, digest: &mut DigestBuilder) -> Result<()> {
        #[derive(Serialize)]
        struct Registry<'a> {
            parties: &'a [RemoteParty],
        }
        let parties = self.snapshot();
        digest.update("remote-parties", &Registry { parties: &parties })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpi_node_core::{Outcome, RemoteAccessInfo, RemoteAccessStatus};
    use ocpi_node_store::{AuditLogExt, MemoryAuditLog};
    use proptest::prelude::*;

    fn ctx() -> WriteContext {
        WriteContext::default()
    }

    fn party(id: &str, token: &str) -> RemoteParty {
        RemoteParty::provisioned(RemotePartyId::new(id), Vec::new(), AccessToken::new(token))
    }

    fn registry() -> (Arc<MemoryAuditLog>, RemotePartyRegistry) {
        let log = Arc::new(MemoryAuditLog::new());
        (log.clone(), RemotePartyRegistry::new(log))
    }

    #[tokio::test]
    async fn test_add_and_lookup_by_token() {
        let (log, registry) = registry();
        let result = registry.add_remote_party(party("p1", "tok-a"), &ctx()).await.unwrap();
        assert_eq!(result.outcome, Outcome::Created);

        let (found, info) = registry
            .try_get_local_access_info(&AccessToken::new("tok-a"))
            .unwrap();
        assert_eq!(found.id.as_str(), "p1");
        assert_eq!(info.status, AccessStatus::Allowed);
        assert!(registry.try_get_local_access_info(&AccessToken::new("nope")).is_none());

        assert_eq!(log.commands(LogStream::RemoteParties).await.unwrap(), vec![ADD_REMOTE_PARTY]);
    }

    #[tokio::test]
    async fn test_duplicate_id_or_token_is_rejected() {
        let (_, registry) = registry();
        registry.add_remote_party(party("p1", "tok-a"), &ctx()).await.unwrap();

        let same_id = registry.add_remote_party(party("p1", "tok-b"), &ctx()).await.unwrap();
        assert!(same_id.is_failed_with(FailureKind::AlreadyExists));

        let same_token = registry.add_remote_party(party("p2", "tok-a"), &ctx()).await.unwrap();
        assert!(same_token.is_failed_with(FailureKind::AlreadyExists));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_party_without_tokens_is_invalid() {
        let (_, registry) = registry();
        let mut bare = party("p1", "tok-a");
        bare.local_access_infos.clear();
        let result = registry.add_remote_party(bare, &ctx()).await.unwrap();
        assert!(result.is_failed_with(FailureKind::Validation));
    }

    #[tokio::test]
    async fn test_if_not_exists_and_update() {
        let (_, registry) = registry();
        let missing = registry.update_remote_party(party("p1", "tok-a"), &ctx()).await.unwrap();
        assert!(missing.is_failed_with(FailureKind::NotFound));

        registry.add_remote_party_if_not_exists(party("p1", "tok-a"), &ctx()).await.unwrap();
        let again = registry
            .add_remote_party_if_not_exists(party("p1", "tok-b"), &ctx())
            .await
            .unwrap();
        assert_eq!(again.outcome, Outcome::NoOperation);

        let updated = registry
            .add_or_update_remote_party(party("p1", "tok-b"), &ctx())
            .await
            .unwrap();
        assert_eq!(updated.outcome, Outcome::Updated);
        assert!(registry.try_get_local_access_info(&AccessToken::new("tok-a")).is_none());
    }

    #[tokio::test]
    async fn test_replace_detects_stale_expected() {
        let (_, registry) = registry();
        let original = registry
            .add_remote_party(party("p1", "tok-a"), &ctx())
            .await
            .unwrap()
            .data
            .unwrap();

        let first = (*original).clone().with_status(PartyStatus::Enabled);
        let result = registry.replace_remote_party(&original, first, &ctx()).await.unwrap();
        assert_eq!(result.outcome, Outcome::Updated);

        let second = (*original).clone().with_remote_access(RemoteAccessInfo {
            access_token: AccessToken::new("tok-b"),
            versions_url: "https://peer.example/versions".into(),
            supported_version_ids: Vec::new(),
            selected_version_id: None,
            status: RemoteAccessStatus::Online,
            not_before: None,
            not_after: None,
        });
        let result = registry.replace_remote_party(&original, second, &ctx()).await.unwrap();
        assert!(result.is_failed_with(FailureKind::ConcurrentUpdate));
        assert!(registry.get(&original.id).unwrap().remote_access_infos.is_empty());
    }

    #[tokio::test]
    async fn test_removing_last_token_removes_party() {
        let (_, registry) = registry();
        let two_tokens = party("p1", "tok-a")
            .with_local_access(LocalAccessInfo::provisioned(AccessToken::new("tok-b")));
        registry.add_remote_party(two_tokens, &ctx()).await.unwrap();

        registry.remove_access_token(&AccessToken::new("tok-a"), &ctx()).await.unwrap();
        let remaining = registry.get(&RemotePartyId::new("p1")).unwrap();
        assert_eq!(remaining.local_access_infos.len(), 1);

        let result = registry.remove_access_token(&AccessToken::new("tok-b"), &ctx()).await.unwrap();
        assert!(result.is_success());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_blocked_token_still_resolves() {
        let (_, registry) = registry();
        registry.add_remote_party(party("p1", "tok-a"), &ctx()).await.unwrap();
        let token = AccessToken::new("tok-a");

        registry.set_access_status(&token, AccessStatus::Blocked, &ctx()).await.unwrap();
        let (_, info) = registry.try_get_local_access_info(&token).unwrap();
        assert_eq!(info.status, AccessStatus::Blocked);

        let again = registry.set_access_status(&token, AccessStatus::Blocked, &ctx()).await.unwrap();
        assert_eq!(again.outcome, Outcome::NoOperation);
    }

    #[tokio::test]
    async fn test_replay_reproduces_registry() {
        let (log, registry) = registry();
        let two_tokens = party("p1", "tok-a")
            .with_local_access(LocalAccessInfo::provisioned(AccessToken::new("tok-b")));
        registry.add_remote_party(two_tokens, &ctx()).await.unwrap();
        registry.add_remote_party(party("p2", "tok-c"), &ctx()).await.unwrap();
        registry.remove_access_token(&AccessToken::new("tok-a"), &ctx()).await.unwrap();
        registry
            .set_party_status(&RemotePartyId::new("p2"), PartyStatus::Enabled, &ctx())
            .await
            .unwrap();
        registry.remove_remote_party(&RemotePartyId::new("p2"), &ctx()).await.unwrap();

        let rebuilt = RemotePartyRegistry::new(Arc::new(MemoryAuditLog::new()));
        rebuilt.replay(&log.entries(LogStream::RemoteParties)).unwrap();
        assert_eq!(rebuilt.snapshot(), registry.snapshot());

        let mut a = DigestBuilder::new();
        registry.digest_into(&mut a).unwrap();
        let mut b = DigestBuilder::new();
        rebuilt.digest_into(&mut b).unwrap();
        assert_eq!(a.finish(), b.finish());
    }

    proptest! {
        #[test]
        fn prop_tokens_never_shared(assignments in prop::collection::vec((0u8..6, 0u8..6), 1..24)) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            runtime.block_on(async {
                let (_, registry) = registry();
                for (party_no, token_no) in assignments {
                    let candidate = party(&format!("p{}", party_no), &format!("tok-{}", token_no));
                    registry.add_or_update_remote_party(candidate, &ctx()).await.unwrap();
                }

                let mut seen = std::collections::HashSet::new();
                for party in registry.list() {
                    for token in party.local_tokens() {
                        prop_assert!(seen.insert(token.clone()));
                    }
                }
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
