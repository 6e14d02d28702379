//! Core error types.

use thiserror::Error;

/// Errors raised while constructing core types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Agent identifier failed validation.
    #[error("invalid agent id '{id}': {reason}")]
    InvalidAgentId {
        /// The rejected identifier.
        id: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
