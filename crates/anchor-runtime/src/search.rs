//! Search delegation.
//!
//! Ranking is done by an external collaborator. The store only passes the
//! query through and filters what comes back: hits for keys that are no
//! longer live are dropped and the remaining values are replaced with the
//! current stored value.

use std::fmt;

use anchor_core::AgentId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Matching key.
    pub key: String,
    /// Value of the key.
    pub value: Value,
    /// Provider-defined similarity, higher is closer.
    pub similarity: f64,
}

/// External ranking service.
///
/// Implementations receive only the agent, the query text and a limit.
#[async_trait]
pub trait SearchProvider: Send + Sync + fmt::Debug {
    /// Rank the agent's keys against `query`, best first.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure; the store wraps it in
    /// [`RuntimeError::Search`](crate::RuntimeError::Search).
    async fn search(
        &self,
        agent_id: &AgentId,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, String>;
}
