//! Unified prelude for the Anchor governance core.
//!
//! A single import for the commonly used types across Anchor crates.
//!
//! # Usage
//!
//! ```rust,ignore
//! use anchor_prelude::*;
//!
//! // Types from:
//! // - anchor-core (AgentId, Timestamp, clocks)
//! // - anchor-crypto (ContentHash)
//! // - anchor-policy (PolicyConfig, PolicyEngine, PolicyRegistry)
//! // - anchor-audit (AuditLog, verification, export)
//! // - anchor-runtime (GovernedStore, CheckpointManager, RetentionReaper)
//! // - anchor-telemetry (LogConfig, setup_logging)
//! ```
//!
//! # Per-Crate Preludes
//!
//! ```rust,ignore
//! use anchor_policy::prelude::*;
//! use anchor_audit::prelude::*;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

// Re-export all crate preludes
pub use anchor_audit::prelude::*;
pub use anchor_core::prelude::*;
pub use anchor_crypto::prelude::*;
pub use anchor_policy::prelude::*;
pub use anchor_runtime::prelude::*;
pub use anchor_telemetry::prelude::*;
