//! Anchor Runtime - The governed store and its lifecycle.
//!
//! This crate provides:
//! - [`GovernedStore`]: per-agent key/value data whose writes must pass the
//!   agent's policy, with every mutation recorded in the audit chain
//! - [`CheckpointManager`]: immutable snapshots and atomic restore
//! - [`RetentionReaper`]: background expiry and tombstone purge
//! - [`SearchProvider`]: delegation of semantic search to a collaborator
//! - [`config_bridge`]: conversion from `anchor_config::Config`
//!
//! # Concurrency
//!
//! Each agent has one serialization domain. Writes, deletes, checkpoint
//! operations and reaper passes for an agent are linearized through it
//! together with their audit appends; different agents never contend.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use anchor_audit::AuditLog;
//! use anchor_core::{AgentId, SystemClock};
//! use anchor_policy::{PolicyConfig, PolicyRegistry};
//! use anchor_runtime::{CheckpointManager, GovernedStore};
//! use serde_json::{Map, json};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = Arc::new(SystemClock);
//! let registry = Arc::new(PolicyRegistry::new(clock.clone()));
//! let audit = Arc::new(AuditLog::in_memory(clock.clone()));
//!
//! let agent = AgentId::new("support_bot")?;
//! registry.update(&agent, PolicyConfig { block_pii: true, ..PolicyConfig::default() })?;
//!
//! let store = GovernedStore::builder(registry, audit).clock(clock).build();
//! let outcome = store
//!     .write(&agent, "user:email", json!("a@b.com"), Map::new())
//!     .await?;
//! assert!(!outcome.allowed);
//!
//! let checkpoints = CheckpointManager::new(store.clone());
//! let checkpoint = checkpoints.create(&agent, "before-import", None).await?;
//! checkpoints.restore(&agent, checkpoint.id).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config_bridge;
pub mod prelude;

mod checkpoint;
mod entry;
mod error;
mod reaper;
mod search;
mod state;
mod store;

pub use checkpoint::{Checkpoint, CheckpointId, CheckpointManager, RestoreOutcome, SnapshotRef};
pub use entry::Entry;
pub use error::{RuntimeError, RuntimeResult};
pub use reaper::{ReaperConfig, ReaperReport, RetentionReaper};
pub use search::{SearchHit, SearchProvider};
pub use store::{
    DEFAULT_LOCK_TIMEOUT, DeleteOutcome, GovernedStore, GovernedStoreBuilder, MAX_KEY_LEN,
    PrefixDeleteOutcome, StoreConfig, WriteOutcome,
};
