//! Prelude module - commonly used types for convenient import.
//!
//! Use `use anchor_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{CoreError, CoreResult};

// Common types
pub use crate::{AgentId, Timestamp};

// Time sources
pub use crate::{Clock, ManualClock, SystemClock};
