//! Slow-storage lookup for resources evicted from memory.

use async_trait::async_trait;

use ocpi_node_core::{PartyId, ResourceKind};

use crate::error::Result;

/// Fallback consulted by `try_get` for Sessions and CDRs that are no longer
/// held in memory. Returns the resource as JSON.
#[async_trait]
pub trait ArchiveLookup: Send + Sync {
    async fn find(
        &self,
        kind: ResourceKind,
        party: &PartyId,
        id: &str,
    ) -> Result<Option<serde_json::Value>>;
}

/// A fixed archive backed by a map, for tests.
pub mod memory {
    use std::collections::HashMap;

    use parking_lot::RwLock;

    use super::*;

    #[derive(Default)]
    pub struct MemoryArchive {
        entries: RwLock<HashMap<(ResourceKind, PartyId, String), serde_json::Value>>,
    }

    impl MemoryArchive {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, kind: ResourceKind, party: PartyId, id: &str, value: serde_json::Value) {
            self.entries.write().insert((kind, party, id.to_string()), value);
        }
    }

    #[async_trait]
    impl ArchiveLookup for MemoryArchive {
        async fn find(
            &self,
            kind: ResourceKind,
            party: &PartyId,
            id: &str,
        ) -> Result<Option<serde_json::Value>> {
            Ok(self
                .entries
                .read()
                .get(&(kind, party.clone(), id.to_string()))
                .cloned())
        }
    }
}
