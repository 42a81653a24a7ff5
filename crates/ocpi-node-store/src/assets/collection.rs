//! Id-indexed collections of shared, immutable resource snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use ocpi_node_core::{
    Cdr, Location, LocalParty, PartyId, Resource, Session, Tariff, TokenStatus,
};

use crate::assets::events::{AssetEvent, Change};

/// One kind of resource for one party.
///
/// Values are `Arc` snapshots. A writer replaces the snapshot; readers
/// holding the old `Arc` keep a consistent view. The lock is never held
/// across an await.
pub struct Collection<R> {
    entries: RwLock<HashMap<String, Arc<R>>>,
}

impl<R: Resource> Collection<R> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<R>> {
        self.entries.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshots sorted by id.
    pub fn list(&self) -> Vec<Arc<R>> {
        let mut items: Vec<Arc<R>> = self.entries.read().values().cloned().collect();
        items.sort_by(|a, b| a.id().cmp(b.id()));
        items
    }

    /// Whether `id` still maps to exactly `expected` (or is absent for `None`).
    pub fn is_current(&self, id: &str, expected: Option<&Arc<R>>) -> bool {
        match (self.entries.read().get(id), expected) {
            (None, None) => true,
            (Some(stored), Some(expected)) => Arc::ptr_eq(stored, expected),
            _ => false,
        }
    }

    pub(crate) fn put(&self, value: Arc<R>) -> Option<Arc<R>> {
        self.entries.write().insert(value.id().to_string(), value)
    }

    pub(crate) fn delete(&self, id: &str) -> Option<Arc<R>> {
        self.entries.write().remove(id)
    }
}

impl<R: Resource> Default for Collection<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the store holds for one local party.
pub struct PartyData {
    pub party: LocalParty,
    pub(crate) locations: Arc<Collection<Location>>,
    pub(crate) tariffs: Arc<Collection<Tariff>>,
    pub(crate) sessions: Arc<Collection<Session>>,
    pub(crate) token_statuses: Arc<Collection<TokenStatus>>,
    pub(crate) cdrs: Arc<Collection<Cdr>>,
}

impl PartyData {
    pub fn new(party: LocalParty) -> Self {
        Self {
            party,
            locations: Arc::new(Collection::new()),
            tariffs: Arc::new(Collection::new()),
            sessions: Arc::new(Collection::new()),
            token_statuses: Arc::new(Collection::new()),
            cdrs: Arc::new(Collection::new()),
        }
    }

    pub fn id(&self) -> &PartyId {
        &self.party.id
    }
}

/// A resource type the store knows where to keep.
pub trait StoredResource: Resource {
    fn collection(party: &PartyData) -> &Arc<Collection<Self>>;

    fn event(change: Change<Self>) -> AssetEvent;
}

impl StoredResource for Location {
    fn collection(party: &PartyData) -> &Arc<Collection<Self>> {
        &party.locations
    }

    fn event(change: Change<Self>) -> AssetEvent {
        AssetEvent::Location(change)
    }
}

impl StoredResource for Tariff {
    fn collection(party: &PartyData) -> &Arc<Collection<Self>> {
        &party.tariffs
    }

    fn event(change: Change<Self>) -> AssetEvent {
        AssetEvent::Tariff(change)
    }
}

impl StoredResource for Session {
    fn collection(party: &PartyData) -> &Arc<Collection<Self>> {
        &party.sessions
    }

    fn event(change: Change<Self>) -> AssetEvent {
        AssetEvent::Session(change)
    }
}

impl StoredResource for TokenStatus {
    fn collection(party: &PartyData) -> &Arc<Collection<Self>> {
        &party.token_statuses
    }

    fn event(change: Change<Self>) -> AssetEvent {
        AssetEvent::TokenStatus(change)
    }
}

impl StoredResource for Cdr {
    fn collection(party: &PartyData) -> &Arc<Collection<Self>> {
        &party.cdrs
    }

    fn event(change: Change<Self>) -> AssetEvent {
        AssetEvent::Cdr(change)
    }
}
