//! # OCPI Node
//!
//! The peer-to-peer synchronization core of an OCPI node: trust and
//! credential exchange, version discovery, and the resource store.
//!
//! ## Overview
//!
//! A [`Node`] ties together:
//!
//! - **Registry**: remote parties and the tokens we issued to them
//! - **Handshake**: the token A → C credential exchange with a peer
//! - **Publisher**: `/versions` documents shaped by who is asking
//! - **Resource store**: Locations, Tariffs, Sessions, TokenStatuses and CDRs per local party
//! - **Audit log**: every mutation, in two streams, replayed on open
//!
//! ## Key Concepts
//!
//! - **Log before apply**: a mutation is acknowledged only after its audit entry is durable
//! - **No downgrades**: an older `last_updated` never replaces a newer one unless allowed
//! - **Compare-and-swap**: concurrent writers to one resource race, the loser retries
//! - **Transport-agnostic**: handlers take a [`RequestContext`] and return an [`OcpiResponse`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ocpi_node::{Node, NodeConfig, RequestContext};
//! use ocpi_node::store::{AuditLogConfig, SqliteAuditLog};
//! use ocpi_node::sync::MemoryPeerNetwork;
//!
//! async fn example() {
//!     let log = SqliteAuditLog::open_dir("data", AuditLogConfig::default()).unwrap();
//!     let node = Node::open(
//!         NodeConfig::new("https://node.example/ocpi"),
//!         Arc::new(log),
//!         MemoryPeerNetwork::new(),
//!     )
//!     .await
//!     .unwrap();
//!
//!     let versions = node.get_versions(&RequestContext::new());
//!     assert!(versions.is_success());
//!
//!     node.close().await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `ocpi_node::core` - Value types, patches, status codes
//! - `ocpi_node::store` - Audit logs and the resource store
//! - `ocpi_node::sync` - Publisher, handshake and peer client
//! - `ocpi_node::perms` - Remote party registry

pub mod config;
pub mod context;
pub mod error;
pub mod node;

// Re-export component crates
pub use ocpi_node_core as core;
pub use ocpi_node_perms as perms;
pub use ocpi_node_store as store;
pub use ocpi_node_sync as sync;

// Re-export main types for convenience
pub use config::NodeConfig;
pub use context::RequestContext;
pub use error::{NodeError, Result};
pub use node::Node;

pub use ocpi_node_core::{
    AccessToken, CommandResult, Credentials, CredentialsRole, FailureKind, LocalParty, Outcome,
    PartyId, RemoteParty, Role, VersionId,
};
pub use ocpi_node_store::{AssetEvent, WriteContext};
pub use ocpi_node_sync::OcpiResponse;
