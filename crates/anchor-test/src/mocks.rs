//! Mock collaborators for testing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use anchor_audit::{AuditError, AuditEvent, AuditResult, AuditStorage, MemoryAuditStorage};
use anchor_core::AgentId;
use anchor_runtime::{SearchHit, SearchProvider};

/// A query received by [`StaticSearch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedQuery {
    /// Agent the search was for.
    pub agent_id: AgentId,
    /// Query text.
    pub query: String,
    /// Requested limit.
    pub limit: usize,
}

/// Search provider that returns a fixed ranking.
///
/// Every call is recorded so tests can check what the store passed through.
#[derive(Debug, Clone, Default)]
pub struct StaticSearch {
    hits: Arc<Mutex<Vec<SearchHit>>>,
    queries: Arc<Mutex<Vec<RecordedQuery>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl StaticSearch {
    /// Create a provider with no hits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hit to the fixed ranking.
    #[must_use]
    pub fn with_hit(self, key: impl Into<String>, value: Value, similarity: f64) -> Self {
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SearchHit {
                key: key.into(),
                value,
                similarity,
            });
        self
    }

    /// Make every call fail with `message`.
    #[must_use]
    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
        self
    }

    /// Queries received so far.
    #[must_use]
    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(
        &self,
        agent_id: &AgentId,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>, String> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedQuery {
                agent_id: agent_id.clone(),
                query: query.to_owned(),
                limit,
            });

        if let Some(message) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(message);
        }

        Ok(self
            .hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// In-memory audit storage whose appends can be made to fail on demand.
///
/// Clones share state, so a test can keep one handle to flip the switch
/// while the audit log owns another.
#[derive(Debug, Clone, Default)]
pub struct FailingAuditStorage {
    inner: Arc<MemoryAuditStorage>,
    failing: Arc<AtomicBool>,
    rejected: Arc<AtomicU64>,
}

impl FailingAuditStorage {
    /// Create storage that accepts appends until told otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage that rejects every append.
    #[must_use]
    pub fn always_failing() -> Self {
        let storage = Self::default();
        storage.set_failing(true);
        storage
    }

    /// Start or stop rejecting appends.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of appends rejected so far.
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }
}

impl AuditStorage for FailingAuditStorage {
    fn append(&self, event: &AuditEvent) -> AuditResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(AuditError::Storage("injected append failure".into()));
        }
        self.inner.append(event)
    }

    fn load(&self, agent_id: &AgentId) -> AuditResult<Vec<AuditEvent>> {
        self.inner.load(agent_id)
    }

    fn agents(&self) -> AuditResult<Vec<AgentId>> {
        self.inner.agents()
    }
}
