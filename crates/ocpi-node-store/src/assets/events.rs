//! Change notifications emitted by the resource store.
//!
//! Events are published on a broadcast channel after the change is logged
//! and applied, in commit order. Nested charging station, EVSE and
//! connector changes surface as a `Changed` event of their Location.

use std::sync::Arc;

use ocpi_node_core::{Cdr, Location, PartyId, Resource, ResourceKind, Session, Tariff, TokenStatus};

/// What happened to a resource.
#[derive(Debug, Clone)]
pub enum Change<R> {
    Added(Arc<R>),
    Changed { previous: Arc<R>, current: Arc<R> },
    Removed(Arc<R>),
}

impl<R: Resource> Change<R> {
    /// The most recent snapshot carried by the change.
    pub fn resource(&self) -> &Arc<R> {
        match self {
            Change::Added(r) | Change::Removed(r) => r,
            Change::Changed { current, .. } => current,
        }
    }
}

/// A committed store change.
#[derive(Debug, Clone)]
pub enum AssetEvent {
    PartyAdded(PartyId),
    PartyRemoved(PartyId),
    Location(Change<Location>),
    Tariff(Change<Tariff>),
    Session(Change<Session>),
    TokenStatus(Change<TokenStatus>),
    Cdr(Change<Cdr>),
}

impl AssetEvent {
    pub fn kind(&self) -> Option<ResourceKind> {
        match self {
            AssetEvent::PartyAdded(_) | AssetEvent::PartyRemoved(_) => None,
            AssetEvent::Location(_) => Some(ResourceKind::Location),
            AssetEvent::Tariff(_) => Some(ResourceKind::Tariff),
            AssetEvent::Session(_) => Some(ResourceKind::Session),
            AssetEvent::TokenStatus(_) => Some(ResourceKind::TokenStatus),
            AssetEvent::Cdr(_) => Some(ResourceKind::Cdr),
        }
    }

    /// `(owner, id)` of the affected resource, if any.
    pub fn resource_key(&self) -> Option<(PartyId, String)> {
        fn key<R: Resource>(change: &Change<R>) -> (PartyId, String) {
            let r = change.resource();
            (r.owner(), r.id().to_string())
        }
        match self {
            AssetEvent::PartyAdded(_) | AssetEvent::PartyRemoved(_) => None,
            AssetEvent::Location(c) => Some(key(c)),
            AssetEvent::Tariff(c) => Some(key(c)),
            AssetEvent::Session(c) => Some(key(c)),
            AssetEvent::TokenStatus(c) => Some(key(c)),
            AssetEvent::Cdr(c) => Some(key(c)),
        }
    }
}
