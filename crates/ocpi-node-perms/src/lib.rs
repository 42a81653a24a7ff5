//! # OCPI Node Permissions
//!
//! The registry of remote parties and the access tokens this node issued
//! to them.
//!
//! ## Overview
//!
//! Every inbound request carries a token. The registry resolves that token
//! to the peer holding it and to the access info (status, validity window,
//! registration state) under which the call is evaluated. Registry changes
//! are written to the `remote-parties` audit stream before they take effect,
//! and the registry is rebuilt from that stream on startup.
//!
//! ## Key Concepts
//!
//! - **Local access info**: a token we issued; the peer presents it to us
//! - **Remote access info**: a token the peer issued; we present it to the peer
//! - **Token A**: provisioned out of band, replaced by token C at registration
//! - **Party status**: whether the relationship as a whole is enabled
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ocpi_node_perms::RemotePartyRegistry;
//! use ocpi_node_core::{AccessToken, RemoteParty, RemotePartyId};
//! use ocpi_node_store::{MemoryAuditLog, WriteContext};
//!
//! async fn example() {
//!     let registry = RemotePartyRegistry::new(Arc::new(MemoryAuditLog::new()));
//!     let token = AccessToken::generate();
//!     let party = RemoteParty::provisioned(RemotePartyId::generate(), Vec::new(), token.clone());
//!     registry.add_remote_party(party, &WriteContext::default()).await.unwrap();
//!
//!     let (party, info) = registry.try_get_local_access_info(&token).unwrap();
//! }
//! ```

pub mod command;
pub mod error;
pub mod registry;

pub use command::RegistryCommand;
pub use error::{RegistryError, Result};
pub use registry::RemotePartyRegistry;
