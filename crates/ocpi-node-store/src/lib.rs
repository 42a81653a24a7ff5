//! # OCPI Node Store
//!
//! Durable audit logging and the in-memory resource store of an OCPI node.
//!
//! ## Overview
//!
//! Every mutation of node state is recorded in an append-only audit log
//! before it becomes visible. The log has two independent streams, one for
//! the remote-party registry and one for the resource store, and is the
//! only persistent state: on startup the node rebuilds memory by replaying
//! both streams.
//!
//! ## Key Types
//!
//! - [`AuditLog`] - The async trait for audit persistence
//! - [`SqliteAuditLog`] - SQLite-backed log, one database per stream
//! - [`MemoryAuditLog`] - In-memory log for tests
//! - [`Journal`] - Serialized check/append/apply commits against one stream
//! - [`AssetStore`] - Locations, Tariffs, Sessions, TokenStatuses and CDRs per local party
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ocpi_node_store::{AssetStore, AssetStoreConfig, SqliteAuditLog, AuditLogConfig, WriteContext};
//! use ocpi_node_core::{BusinessDetails, LocalParty, PartyId, Role};
//!
//! async fn example() {
//!     let log = Arc::new(SqliteAuditLog::open_dir("audit", AuditLogConfig::default()).unwrap());
//!     let store = AssetStore::new(log, AssetStoreConfig::default());
//!
//!     let party = PartyId::new("DE", "ABC").unwrap();
//!     let ctx = WriteContext::default();
//!     store
//!         .add_party(LocalParty::new(party, Role::Cpo, BusinessDetails::named("ABC")), &ctx)
//!         .await
//!         .unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Log before apply**: a change is applied only after its entry is durable
//! - **Snapshots, not diffs**: writes log the resulting resource, so replay is an upsert
//! - **Compare-and-swap**: a write commits only if the value it was computed from is still current
//! - **Downgrade prevention**: older `last_updated` never overwrites newer data unless allowed
//! - **Immutable log**: the SQLite schema rejects UPDATE and DELETE on entries

pub mod assets;
pub mod error;
pub mod journal;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use assets::{
    archive::memory::MemoryArchive, ArchiveLookup, AssetEvent, AssetStore, AssetStoreConfig,
    Change, PartySnapshot, StoredResource,
};
pub use error::{Result, StoreError};
pub use journal::Journal;
pub use memory::MemoryAuditLog;
pub use sqlite::{AuditLogConfig, SqliteAuditLog};
pub use traits::{AuditLog, AuditLogEntry, AuditLogExt, LogStream, WriteContext};
