//! Audit-related error types.

use thiserror::Error;

/// Errors that can occur with audit logging.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Storage error. The chain head did not advance.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The chain failed verification.
    #[error("chain integrity violation for agent {agent_id} at event {event_id}: {reason}")]
    ChainIntegrity {
        /// Agent whose chain is broken.
        agent_id: String,
        /// First event that failed verification.
        event_id: String,
        /// What failed.
        reason: String,
    },

    /// Unknown export format name.
    #[error("unknown export format: {0}")]
    UnknownFormat(String),

    /// I/O error from the file backend.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
