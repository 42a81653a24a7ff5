//! # OCPI Node Sync
//!
//! Capability discovery and the credential handshake between OCPI peers.
//!
//! ## Overview
//!
//! Two nodes become peers in three steps. The operator provisions a
//! token A out of band. The peer calls our credentials endpoint with it,
//! handing over its own token B and versions URL. We probe the peer with
//! token B, and on success answer with a fresh token C that replaces A.
//!
//! ## Key Properties
//!
//! - **Probe before write**: no registry change happens until the peer answered
//! - **Atomic rotation**: token A disappears in the same commit that adds C
//! - **Bounded**: each outbound probe has its own timeout
//! - **Caller-shaped discovery**: endpoints listed depend on the caller's roles
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ocpi_node_sync::{CredentialExchange, HandshakeConfig, OpenDataConfig, VersionPublisher};
//! use ocpi_node_sync::client::memory::MemoryPeerNetwork;
//! use ocpi_node_perms::RemotePartyRegistry;
//! use ocpi_node_core::VersionId;
//! use ocpi_node_store::MemoryAuditLog;
//!
//! async fn example() {
//!     let registry = Arc::new(RemotePartyRegistry::new(Arc::new(MemoryAuditLog::new())));
//!     let publisher = Arc::new(VersionPublisher::new(
//!         "https://node.example/ocpi",
//!         vec![VersionId::v2_2_1()],
//!         OpenDataConfig::default(),
//!     ));
//!     let exchange = CredentialExchange::new(
//!         registry,
//!         MemoryPeerNetwork::new(),
//!         publisher,
//!         HandshakeConfig::default(),
//!     );
//!     // let credentials = exchange.register(&version, Some(&token_a), body, roles, &ctx).await?;
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Peer                                 Node
//!   |-- POST /credentials (A; B, url) -->|
//!   |<------- GET {url} (B) -------------|
//!   |-------- versions ----------------->|
//!   |<------- GET {version url} (B) -----|
//!   |-------- endpoints ---------------->|
//!   |<------- 200 (C, our url) ----------|
//! ```

pub mod client;
pub mod envelope;
pub mod error;
pub mod handshake;
pub mod publisher;

pub use client::{memory::FakePeer, memory::MemoryPeerNetwork, PeerClient};
pub use envelope::OcpiResponse;
pub use error::{ClientError, HandshakeError, Result};
pub use handshake::{CredentialExchange, HandshakeConfig};
pub use publisher::{Caller, OpenDataConfig, VersionPublisher};
