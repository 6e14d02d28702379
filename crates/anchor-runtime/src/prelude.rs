//! Prelude module - commonly used types for convenient import.
//!
//! Use `use anchor_runtime::prelude::*;` to import all essential types.

// Errors
pub use crate::{RuntimeError, RuntimeResult};

// Store
pub use crate::{
    DeleteOutcome, Entry, GovernedStore, PrefixDeleteOutcome, StoreConfig, WriteOutcome,
};

// Checkpoints
pub use crate::{Checkpoint, CheckpointId, CheckpointManager, RestoreOutcome};

// Retention
pub use crate::{ReaperConfig, ReaperReport, RetentionReaper};

// Search
pub use crate::{SearchHit, SearchProvider};
