//! The resource store: per-party collections with downgrade prevention and
//! compare-and-swap updates, logged to the asset audit stream.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use ocpi_node_core::{
    allows_write, apply_patch, effective_allow_downgrades, Cdr, CommandResult, DigestBuilder,
    FailureKind, LocalParty, Location, PartyId, Resource, ResourceKind, Role, Session, Tariff, TokenStatus,
};

use crate::assets::archive::ArchiveLookup;
use crate::assets::collection::{PartyData, StoredResource};
use crate::assets::command::{
    remove_all_command, remove_command, AssetCommand, BulkRemoval, ResourceKey, WriteVerb,
    ADD_PARTY, REMOVE_PARTY,
};
use crate::assets::events::{AssetEvent, Change};
use crate::error::{Result, StoreError};
use crate::journal::Journal;
use crate::traits::{AuditLog, AuditLogEntry, LogStream, WriteContext};

const RETRY_MESSAGE: &str = "update failed, please retry";

/// Configuration for the resource store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetStoreConfig {
    /// Node-wide downgrade default, used when neither the request nor the
    /// party decides.
    pub allow_downgrades: bool,
    /// Capacity of the change-event channel.
    pub event_capacity: usize,
}

impl Default for AssetStoreConfig {
    fn default() -> Self {
        Self {
            allow_downgrades: false,
            event_capacity: 1024,
        }
    }
}

impl AssetStoreConfig {
    pub fn with_allow_downgrades(mut self, allow: bool) -> Self {
        self.allow_downgrades = allow;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

type PartyMap = RwLock<HashMap<PartyId, Arc<PartyData>>>;

/// Why a commit did not happen.
pub(super) enum Rejected {
    Failure(FailureKind, String),
    Nothing,
    Store(StoreError),
}

/// Serializable view of one party's data, sorted for hashing.
#[derive(Debug, Clone, Serialize)]
pub struct PartySnapshot {
    pub party: LocalParty,
    pub locations: Vec<Location>,
    pub tariffs: Vec<Tariff>,
    pub sessions: Vec<Session>,
    pub token_statuses: Vec<TokenStatus>,
    pub cdrs: Vec<Cdr>,
}

/// The resource store.
pub struct AssetStore {
    parties: Arc<PartyMap>,
    journal: Journal,
    events: broadcast::Sender<AssetEvent>,
    archive: RwLock<Option<Arc<dyn ArchiveLookup>>>,
    config: AssetStoreConfig,
}

fn party_is_current(parties: &PartyMap, party: &Arc<PartyData>) -> bool {
    parties
        .read()
        .get(party.id())
        .map_or(false, |stored| Arc::ptr_eq(stored, party))
}

fn unknown_party<T>(party: &PartyId) -> CommandResult<T> {
    CommandResult::failed(FailureKind::NotFound, format!("unknown party {}", party))
}

fn not_found<T>(kind: ResourceKind, party: &PartyId, id: &str) -> CommandResult<T> {
    CommandResult::failed(
        FailureKind::NotFound,
        format!("{} {} not found for party {}", kind, id, party),
    )
}

fn owned<R: Clone>(items: Vec<Arc<R>>) -> Vec<R> {
    items.iter().map(|item| (**item).clone()).collect()
}

impl AssetStore {
    pub fn new(log: Arc<dyn AuditLog>, config: AssetStoreConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            parties: Arc::new(RwLock::new(HashMap::new())),
            journal: Journal::new(log, LogStream::Assets),
            events,
            archive: RwLock::new(None),
            config,
        }
    }

    /// Install the slow-storage fallback for Sessions and CDRs.
    pub fn set_archive(&self, archive: Arc<dyn ArchiveLookup>) {
        *self.archive.write() = Some(archive);
    }

    /// Receive every committed change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AssetEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &AssetStoreConfig {
        &self.config
    }

    pub(super) fn party_data(&self, id: &PartyId) -> Option<Arc<PartyData>> {
        self.parties.read().get(id).cloned()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local parties
    // ─────────────────────────────────────────────────────────────────────────

    pub fn party(&self, id: &PartyId) -> Option<LocalParty> {
        self.party_data(id).map(|data| data.party.clone())
    }

    /// All local parties, sorted by id.
    pub fn parties(&self) -> Vec<LocalParty> {
        let mut parties: Vec<LocalParty> = self
            .parties
            .read()
            .values()
            .map(|data| data.party.clone())
            .collect();
        parties.sort_by(|a, b| a.id.cmp(&b.id));
        parties
    }

    pub fn has_local_role(&self, role: Role) -> bool {
        self.parties.read().values().any(|data| data.party.role == role)
    }

    pub async fn add_party(
        &self,
        party: LocalParty,
        ctx: &WriteContext,
    ) -> Result<CommandResult<LocalParty>> {
        if self.party_data(&party.id).is_some() {
            return Ok(CommandResult::failed(
                FailureKind::AlreadyExists,
                format!("party {} already exists", party.id),
            ));
        }

        let entry = AuditLogEntry::new(ADD_PARTY, Some(&party), ctx)?;
        let parties = Arc::clone(&self.parties);
        let events = self.events.clone();
        let added = party.clone();

        let outcome = self
            .journal
            .commit(
                {
                    let parties = Arc::clone(&parties);
                    move || {
                        if parties.read().contains_key(&party.id) {
                            return Err(Rejected::Failure(FailureKind::AlreadyExists, RETRY_MESSAGE.into()));
                        }
                        Ok((entry, party))
                    }
                },
                move |party| {
                    let id = party.id.clone();
                    parties.write().insert(id.clone(), Arc::new(PartyData::new(party)));
                    let _ = events.send(AssetEvent::PartyAdded(id));
                },
            )
            .await?;

        finish(outcome, || {
            tracing::info!(party = %added.id, role = %added.role, "local party added");
            CommandResult::created(added)
        })
    }

    /// Remove a local party together with all its resources.
    pub async fn remove_party(
        &self,
        id: &PartyId,
        ctx: &WriteContext,
    ) -> Result<CommandResult<LocalParty>> {
        let Some(data) = self.party_data(id) else {
            return Ok(unknown_party(id));
        };

        let entry = AuditLogEntry::new(REMOVE_PARTY, Some(id), ctx)?;
        let parties = Arc::clone(&self.parties);
        let events = self.events.clone();
        let removed = data.party.clone();

        let outcome = self
            .journal
            .commit(
                {
                    let parties = Arc::clone(&parties);
                    move || {
                        if !party_is_current(&parties, &data) {
                            return Err(Rejected::Failure(FailureKind::ConcurrentUpdate, RETRY_MESSAGE.into()));
                        }
                        Ok((entry, data))
                    }
                },
                move |data| {
                    parties.write().remove(data.id());
                    let _ = events.send(AssetEvent::PartyRemoved(data.id().clone()));
                },
            )
            .await?;

        finish(outcome, || {
            tracing::info!(party = %removed.id, "local party removed");
            CommandResult::success(removed)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// In-memory lookup, falling back to the archive for Sessions and CDRs.
    pub async fn try_get<R: StoredResource>(&self, party: &PartyId, id: &str) -> Result<Option<Arc<R>>> {
        if let Some(found) = self.party_data(party).and_then(|data| R::collection(&data).get(id)) {
            return Ok(Some(found));
        }

        if !R::KIND.is_archived() {
            return Ok(None);
        }

        let archive = self.archive.read().clone();
        let Some(archive) = archive else {
            return Ok(None);
        };

        match archive.find(R::KIND, party, id).await? {
            Some(value) => {
                tracing::debug!(kind = %R::KIND, party = %party, id, "served from archive");
                Ok(Some(Arc::new(serde_json::from_value(value)?)))
            }
            None => Ok(None),
        }
    }

    pub fn exists<R: StoredResource>(&self, party: &PartyId, id: &str) -> bool {
        self.party_data(party)
            .map_or(false, |data| R::collection(&data).contains(id))
    }

    pub fn list<R: StoredResource>(&self, party: &PartyId) -> Vec<Arc<R>> {
        self.party_data(party)
            .map(|data| R::collection(&data).list())
            .unwrap_or_default()
    }

    pub fn count<R: StoredResource>(&self, party: &PartyId) -> usize {
        self.party_data(party)
            .map_or(0, |data| R::collection(&data).len())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new resource. Fails if the id is taken.
    pub async fn add<R: StoredResource>(&self, resource: R, ctx: &WriteContext) -> Result<CommandResult<Arc<R>>> {
        let owner = resource.owner();
        let Some(party) = self.party_data(&owner) else {
            return Ok(unknown_party(&owner));
        };

        if R::collection(&party).contains(resource.id()) {
            return Ok(CommandResult::failed(
                FailureKind::AlreadyExists,
                format!("{} {} already exists", R::KIND, resource.id()),
            ));
        }

        self.put(&party, None, resource, WriteVerb::Add, ctx).await
    }

    /// Insert unless present; an existing resource yields `NoOperation`.
    pub async fn add_if_not_exists<R: StoredResource>(
        &self,
        resource: R,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Arc<R>>> {
        let owner = resource.owner();
        let Some(party) = self.party_data(&owner) else {
            return Ok(unknown_party(&owner));
        };

        if let Some(existing) = R::collection(&party).get(resource.id()) {
            return Ok(CommandResult::no_operation(Some(existing)));
        }

        let id = resource.id().to_string();
        let result = self.put(&party, None, resource, WriteVerb::Add, ctx).await?;
        if result.is_failed_with(FailureKind::ConcurrentUpdate) {
            // Lost the insert to another writer; the resource now exists.
            if let Some(existing) = R::collection(&party).get(&id) {
                return Ok(CommandResult::no_operation(Some(existing)));
            }
        }
        Ok(result)
    }

    /// Insert, or replace subject to the downgrade rule.
    pub async fn add_or_update<R: StoredResource>(
        &self,
        resource: R,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Arc<R>>> {
        let owner = resource.owner();
        let Some(party) = self.party_data(&owner) else {
            return Ok(unknown_party(&owner));
        };

        match R::collection(&party).get(resource.id()) {
            None => self.put(&party, None, resource, WriteVerb::AddOrUpdate, ctx).await,
            Some(existing) => {
                self.replace(&party, existing, resource, WriteVerb::AddOrUpdate, ctx)
                    .await
            }
        }
    }

    /// Replace an existing resource subject to the downgrade rule.
    pub async fn update<R: StoredResource>(&self, resource: R, ctx: &WriteContext) -> Result<CommandResult<Arc<R>>> {
        let owner = resource.owner();
        let Some(party) = self.party_data(&owner) else {
            return Ok(unknown_party(&owner));
        };

        match R::collection(&party).get(resource.id()) {
            None => Ok(not_found(R::KIND, &owner, resource.id())),
            Some(existing) => self.replace(&party, existing, resource, WriteVerb::Update, ctx).await,
        }
    }

    /// Merge-patch a stored resource and persist the result as an update.
    pub async fn try_patch<R: StoredResource>(
        &self,
        party_id: &PartyId,
        id: &str,
        patch: &Value,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Arc<R>>> {
        let Some(party) = self.party_data(party_id) else {
            return Ok(unknown_party(party_id));
        };
        let Some(existing) = R::collection(&party).get(id) else {
            return Ok(not_found(R::KIND, party_id, id));
        };

        let patched = match apply_patch(existing.as_ref(), patch) {
            Ok(patched) => patched,
            Err(e) => {
                tracing::warn!(kind = %R::KIND, party = %party_id, id, error = %e, "patch rejected");
                return Ok(CommandResult::failed(FailureKind::Validation, e.to_string()));
            }
        };

        self.replace(&party, existing, patched, WriteVerb::Update, ctx).await
    }

    pub async fn remove<R: StoredResource>(
        &self,
        party_id: &PartyId,
        id: &str,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Arc<R>>> {
        let Some(party) = self.party_data(party_id) else {
            return Ok(unknown_party(party_id));
        };
        let Some(existing) = R::collection(&party).get(id) else {
            return Ok(not_found(R::KIND, party_id, id));
        };

        let entry = AuditLogEntry::new(remove_command(R::KIND), Some(&ResourceKey::new(party_id, id)), ctx)?;
        let parties = Arc::clone(&self.parties);
        let events = self.events.clone();
        let removed = Arc::clone(&existing);
        let id = id.to_string();

        let outcome = self
            .journal
            .commit(
                move || {
                    let coll = R::collection(&party);
                    if !party_is_current(&parties, &party) || !coll.is_current(&id, Some(&existing)) {
                        return Err(Rejected::Failure(FailureKind::ConcurrentUpdate, RETRY_MESSAGE.into()));
                    }
                    Ok((entry, (party, existing)))
                },
                move |(party, existing)| {
                    R::collection(&party).delete(existing.id());
                    let _ = events.send(R::event(Change::Removed(existing)));
                },
            )
            .await?;

        finish(outcome, || CommandResult::success(removed))
    }

    /// Remove every resource of kind `R` owned by the party, as one logged command.
    pub async fn remove_all<R: StoredResource>(
        &self,
        party_id: &PartyId,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Vec<Arc<R>>>> {
        let Some(party) = self.party_data(party_id) else {
            return Ok(unknown_party(party_id));
        };

        let parties = Arc::clone(&self.parties);
        let events = self.events.clone();
        let ctx = ctx.clone();

        let outcome = self
            .journal
            .commit(
                move || {
                    if !party_is_current(&parties, &party) {
                        return Err(Rejected::Failure(FailureKind::ConcurrentUpdate, RETRY_MESSAGE.into()));
                    }
                    let items = R::collection(&party).list();
                    if items.is_empty() {
                        return Err(Rejected::Nothing);
                    }
                    let removal = BulkRemoval {
                        country_code: party.id().country_code.clone(),
                        party_id: party.id().party_id.clone(),
                        ids: items.iter().map(|r| r.id().to_string()).collect(),
                    };
                    let entry = AuditLogEntry::new(remove_all_command(R::KIND), Some(&removal), &ctx)
                        .map_err(Rejected::Store)?;
                    Ok((entry, (party, items)))
                },
                move |(party, items)| {
                    let coll = R::collection(&party);
                    for item in &items {
                        coll.delete(item.id());
                        let _ = events.send(R::event(Change::Removed(Arc::clone(item))));
                    }
                    items
                },
            )
            .await?;

        match outcome {
            Ok(items) => Ok(CommandResult::success(items)),
            Err(Rejected::Nothing) => Ok(CommandResult::no_operation(Some(Vec::new()))),
            Err(Rejected::Failure(kind, message)) => Ok(CommandResult::failed(kind, message)),
            Err(Rejected::Store(e)) => Err(e),
        }
    }

    /// Downgrade-check `resource` against `existing`, then CAS it in.
    pub(super) async fn replace<R: StoredResource>(
        &self,
        party: &Arc<PartyData>,
        existing: Arc<R>,
        mut resource: R,
        verb: WriteVerb,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Arc<R>>> {
        let allow = effective_allow_downgrades(
            ctx.allow_downgrades,
            party.party.allow_downgrades,
            self.config.allow_downgrades,
        );

        if !allows_write(existing.last_updated(), resource.last_updated(), allow) {
            tracing::warn!(
                kind = %R::KIND,
                party = %party.id(),
                id = resource.id(),
                stored = %existing.last_updated(),
                incoming = %resource.last_updated(),
                event_tracking_id = %ctx.event_tracking_id,
                "rejected downgrade"
            );
            return Ok(CommandResult::failed(
                FailureKind::Downgrade,
                format!(
                    "{} {} last_updated {} is not newer than stored {}",
                    R::KIND,
                    resource.id(),
                    resource.last_updated(),
                    existing.last_updated()
                ),
            ));
        }

        if resource.version_id() < existing.version_id() {
            resource.set_version_id(existing.version_id());
        }

        self.put(party, Some(existing), resource, verb, ctx).await
    }

    /// Commit `resource` if the stored value is still `expected`.
    async fn put<R: StoredResource>(
        &self,
        party: &Arc<PartyData>,
        expected: Option<Arc<R>>,
        resource: R,
        verb: WriteVerb,
        ctx: &WriteContext,
    ) -> Result<CommandResult<Arc<R>>> {
        let value = Arc::new(resource);
        let entry = AuditLogEntry::new(verb.command(R::KIND), Some(value.as_ref()), ctx)?;
        let parties = Arc::clone(&self.parties);
        let events = self.events.clone();
        let party = Arc::clone(party);
        let created = expected.is_none();
        let result = Arc::clone(&value);

        let outcome = self
            .journal
            .commit(
                move || {
                    let coll = R::collection(&party);
                    if !party_is_current(&parties, &party) {
                        return Err(Rejected::Failure(
                            FailureKind::NotFound,
                            format!("party {} was removed", party.id()),
                        ));
                    }
                    if !coll.is_current(value.id(), expected.as_ref()) {
                        return Err(Rejected::Failure(FailureKind::ConcurrentUpdate, RETRY_MESSAGE.into()));
                    }
                    Ok((entry, (party, expected, value)))
                },
                move |(party, expected, value)| {
                    R::collection(&party).put(Arc::clone(&value));
                    let change = match expected {
                        None => Change::Added(value),
                        Some(previous) => Change::Changed {
                            previous,
                            current: value,
                        },
                    };
                    let _ = events.send(R::event(change));
                },
            )
            .await?;

        if let Err(Rejected::Failure(kind, _)) = &outcome {
            tracing::warn!(
                kind = %R::KIND,
                id = result.id(),
                failure = %kind,
                event_tracking_id = %ctx.event_tracking_id,
                "write not committed"
            );
        }

        finish(outcome, || {
            tracing::debug!(kind = %R::KIND, id = result.id(), version = result.version_id(), "committed");
            if created {
                CommandResult::created(result)
            } else {
                CommandResult::updated(result)
            }
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Replay and snapshots
    // ─────────────────────────────────────────────────────────────────────────

    /// Rebuild state from asset-stream entries. No checks, no logging, no events.
    pub fn replay(&self, entries: &[AuditLogEntry]) -> Result<usize> {
        for entry in entries {
            match AssetCommand::parse(entry)? {
                AssetCommand::AddParty(party) => {
                    let id = party.id.clone();
                    self.parties.write().insert(id, Arc::new(PartyData::new(party)));
                }
                AssetCommand::RemoveParty(id) => {
                    self.parties.write().remove(&id);
                }
                AssetCommand::Put { kind, snapshot, .. } => match kind {
                    ResourceKind::Location => self.replay_put::<Location>(snapshot)?,
                    ResourceKind::Tariff => self.replay_put::<Tariff>(snapshot)?,
                    ResourceKind::Session => self.replay_put::<Session>(snapshot)?,
                    ResourceKind::TokenStatus => self.replay_put::<TokenStatus>(snapshot)?,
                    ResourceKind::Cdr => self.replay_put::<Cdr>(snapshot)?,
                },
                AssetCommand::Remove { kind, key } => {
                    self.replay_remove(kind, &key.party(), std::slice::from_ref(&key.id))
                }
                AssetCommand::RemoveAll { kind, removal } => {
                    self.replay_remove(kind, &removal.party(), &removal.ids)
                }
            }
        }

        tracing::debug!(entries = entries.len(), parties = self.parties.read().len(), "asset log replayed");
        Ok(entries.len())
    }

    fn replay_put<R: StoredResource>(&self, snapshot: Value) -> Result<()> {
        let value: R = serde_json::from_value(snapshot)?;
        match self.party_data(&value.owner()) {
            Some(party) => {
                R::collection(&party).put(Arc::new(value));
            }
            None => {
                tracing::warn!(kind = %R::KIND, id = value.id(), "replayed write for unknown party skipped");
            }
        }
        Ok(())
    }

    fn replay_remove(&self, kind: ResourceKind, party: &PartyId, ids: &[String]) {
        let Some(data) = self.party_data(party) else {
            return;
        };
        for id in ids {
            match kind {
                ResourceKind::Location => {
                    data.locations.delete(id);
                }
                ResourceKind::Tariff => {
                    data.tariffs.delete(id);
                }
                ResourceKind::Session => {
                    data.sessions.delete(id);
                }
                ResourceKind::TokenStatus => {
                    data.token_statuses.delete(id);
                }
                ResourceKind::Cdr => {
                    data.cdrs.delete(id);
                }
            }
        }
    }

    /// Sorted, owned copy of everything held, for digests and inspection.
    pub fn snapshot(&self) -> Vec<PartySnapshot> {
        let mut parties: Vec<Arc<PartyData>> = self.parties.read().values().cloned().collect();
        parties.sort_by(|a, b| a.id().cmp(b.id()));

        parties
            .iter()
            .map(|data| PartySnapshot {
                party: data.party.clone(),
                locations: owned(data.locations.list()),
                tariffs: owned(data.tariffs.list()),
                sessions: owned(data.sessions.list()),
                token_statuses: owned(data.token_statuses.list()),
                cdrs: owned(data.cdrs.list()),
            })
            .collect()
    }

    /// Feed the full store state into a digest.
    pub fn digest_into(&self, digest: &mut DigestBuilder) -> Result<()> {
        for party in self.snapshot() {
            digest.update("asset-party", &party)?;
        }
        Ok(())
    }
}

/// Turn a journal outcome into a command result.
fn finish<T, R>(
    outcome: std::result::Result<R, Rejected>,
    on_success: impl FnOnce() -> CommandResult<T>,
) -> Result<CommandResult<T>> {
    match outcome {
        Ok(_) => Ok(on_success()),
        Err(Rejected::Failure(kind, message)) => Ok(CommandResult::failed(kind, message)),
        Err(Rejected::Nothing) => Ok(CommandResult::no_operation(None)),
        Err(Rejected::Store(e)) => Err(e),
    }
}
