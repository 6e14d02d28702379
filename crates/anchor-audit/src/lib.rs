//! Anchor Audit - Per-agent hash-chained audit logging.
//!
//! This crate provides:
//! - Immutable audit events, each linked to its predecessor by hash
//! - In-memory and append-only JSONL storage
//! - Query, chain verification and export
//!
//! # Security Model
//!
//! Every event carries its agent, its position in the chain, the hash of the
//! previous event and its own hash over all of that. Modifying, dropping or
//! reordering any past event is detectable from the serialized chain alone.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use anchor_audit::{AuditLog, AuditOperation, AuditOutcome, AuditRecord};
//! use anchor_core::{AgentId, SystemClock};
//!
//! let log = AuditLog::in_memory(Arc::new(SystemClock));
//! let agent = AgentId::new("agent_1").unwrap();
//!
//! log.append(
//!     &agent,
//!     AuditRecord::new(AuditOperation::DataWrite, "user:name", AuditOutcome::Allowed)
//!         .meta("version", 1),
//! )
//! .unwrap();
//!
//! let result = log.verify(&agent).unwrap();
//! assert!(result.valid);
//! assert_eq!(result.events_checked, 1);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod event;
mod export;
mod log;
mod query;
mod storage;
mod verify;

pub use error::{AuditError, AuditResult};
pub use event::{AuditEvent, AuditEventId, AuditOperation, AuditOutcome, AuditRecord};
pub use export::{AuditExport, ExportFormat, ParsedExport, parse_export};
pub use log::AuditLog;
pub use query::AuditQuery;
pub use storage::{AuditStorage, FileAuditStorage, MemoryAuditStorage};
pub use verify::{ChainIssue, ChainVerification, verify_events};
