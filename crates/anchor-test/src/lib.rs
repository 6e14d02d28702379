//! Anchor Test - Shared test utilities for the Anchor governance core.
//!
//! This crate provides fixtures, mock collaborators and a harness that wires
//! a store, policy registry, audit log and checkpoint manager to a manual
//! clock. It is used across Anchor crates as a dev-dependency.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! anchor-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use anchor_test::{GovernanceHarness, pii_policy, test_agent_id};
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_pii_is_blocked() {
//!     let h = GovernanceHarness::new();
//!     let agent = test_agent_id();
//!     h.set_policy(&agent, pii_policy());
//!
//!     let outcome = h.write(&agent, "user:email", json!("a@b.com")).await;
//!     assert!(!outcome.allowed);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
