//! Runtime error types.

use thiserror::Error;

/// Errors that can occur in the governed store.
///
/// A write denied by policy is not an error; it is a
/// [`WriteOutcome`](crate::WriteOutcome) with `allowed == false`.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Key absent, tombstoned or expired.
    #[error("key not found for agent {agent_id}: {key}")]
    NotFound {
        /// The agent.
        agent_id: String,
        /// The key.
        key: String,
    },

    /// Checkpoint absent.
    #[error("checkpoint not found for agent {agent_id}: {checkpoint_id}")]
    CheckpointNotFound {
        /// The agent.
        agent_id: String,
        /// The checkpoint ID.
        checkpoint_id: String,
    },

    /// The agent's serialization section could not be entered in time.
    /// Nothing was changed; the caller may retry.
    #[error("timed out after {timeout_ms}ms waiting for agent {agent_id}")]
    ConcurrencyTimeout {
        /// The agent.
        agent_id: String,
        /// How long the caller waited.
        timeout_ms: u64,
    },

    /// Key or prefix is not acceptable.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey {
        /// The rejected key or prefix.
        key: String,
        /// Why.
        reason: &'static str,
    },

    /// No search collaborator is configured.
    #[error("search is not configured")]
    SearchUnavailable,

    /// Search collaborator failed.
    #[error("search error: {0}")]
    Search(String),

    /// Policy error.
    #[error("policy error: {0}")]
    Policy(#[from] anchor_policy::PolicyError),

    /// Audit error.
    #[error("audit error: {0}")]
    Audit(#[from] anchor_audit::AuditError),

    /// Configuration cannot be turned into runtime components.
    #[error("config error: {0}")]
    Config(#[from] anchor_config::ConfigError),

    /// Core type error.
    #[error("core error: {0}")]
    Core(#[from] anchor_core::CoreError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
