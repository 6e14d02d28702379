//! Policy error types.

use thiserror::Error;

/// Errors raised while installing or looking up policies.
///
/// A denied write is not an error: it is a [`Decision`](crate::Decision)
/// with `allowed == false`.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A policy field failed validation. Raised at update time so that an
    /// invalid policy never becomes active.
    #[error("invalid policy field {field}: {message}")]
    Validation {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The requested policy version does not exist for this agent.
    #[error("policy version {version} not found for agent {agent_id}")]
    VersionNotFound {
        /// Agent the lookup was for.
        agent_id: String,
        /// Requested version.
        version: u64,
    },

    /// The registry's internal state could not be accessed.
    #[error("policy registry error: {0}")]
    Registry(String),
}

impl PolicyError {
    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
