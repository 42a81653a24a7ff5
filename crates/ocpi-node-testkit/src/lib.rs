//! # OCPI Node Testkit
//!
//! Testing utilities for the OCPI node.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: sample parties and resources, and ready-made nodes on an in-memory log
//! - **Generators**: proptest strategies for identifiers, timestamps, resources and patches
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use ocpi_node_testkit::fixtures::TestNode;
//! use ocpi_node_core::Role;
//!
//! async fn example() {
//!     let fixture = TestNode::with_cpo().await;
//!     let registered = fixture
//!         .register_peer("https://peer.example/ocpi", &[Role::Emsp])
//!         .await;
//!     assert!(registered.token_c().is_some());
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use ocpi_node_testkit::generators::{location, timestamp};
//!
//! proptest! {
//!     #[test]
//!     fn older_never_wins(loc in location(), at in timestamp()) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{cpo_party, emsp_party, sample_location, Registered, TestNode};
