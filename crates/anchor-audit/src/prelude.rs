//! Prelude module - commonly used types for convenient import.
//!
//! Use `use anchor_audit::prelude::*;` to import all essential types.

// Errors
pub use crate::{AuditError, AuditResult};

// Event types
pub use crate::{AuditEvent, AuditEventId, AuditOperation, AuditOutcome, AuditRecord};

// Log, query and verification
pub use crate::{AuditLog, AuditQuery, ChainIssue, ChainVerification, verify_events};

// Export
pub use crate::{AuditExport, ExportFormat};

// Storage
pub use crate::{AuditStorage, FileAuditStorage, MemoryAuditStorage};
