//! Test harness helpers.

use std::sync::Arc;

use chrono::Duration;
use serde_json::{Map, Value};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use anchor_audit::{AuditLog, AuditStorage, MemoryAuditStorage};
use anchor_core::{AgentId, Clock, ManualClock, Timestamp};
use anchor_policy::{PolicyConfig, PolicyRegistry, PolicySource, PolicyVersion};
use anchor_runtime::{
    CheckpointManager, GovernedStore, ReaperConfig, RetentionReaper, SearchProvider, StoreConfig,
    WriteOutcome,
};

use crate::fixtures::test_start_time;

/// Create a temporary directory for testing.
///
/// # Panics
///
/// Panics if the temporary directory cannot be created.
#[must_use]
pub fn test_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Set up test logging with the given filter.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// A fully wired governance stack on a manual clock.
///
/// The clock starts at [`test_start_time`] and only moves through
/// [`GovernanceHarness::advance`].
#[derive(Debug)]
pub struct GovernanceHarness {
    /// Shared manual clock.
    pub clock: ManualClock,
    /// Policy registry the store reads from.
    pub registry: Arc<PolicyRegistry>,
    /// Audit log the store appends to.
    pub audit: Arc<AuditLog>,
    /// The governed store.
    pub store: GovernedStore,
    /// Checkpoint manager over `store`.
    pub checkpoints: CheckpointManager,
}

impl GovernanceHarness {
    /// Harness with in-memory audit storage and default store settings.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start configuring a harness.
    #[must_use]
    pub fn builder() -> GovernanceHarnessBuilder {
        GovernanceHarnessBuilder::default()
    }

    /// Install `policy` for `agent_id`.
    ///
    /// # Panics
    ///
    /// Panics if the policy fails validation.
    pub fn set_policy(&self, agent_id: &AgentId, policy: PolicyConfig) -> PolicyVersion {
        self.registry
            .update(agent_id, policy)
            .expect("test policy should be valid")
    }

    /// Move the clock forward.
    pub fn advance(&self, delta: Duration) {
        self.clock.advance(delta);
    }

    /// Current harness time.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Write with empty metadata.
    ///
    /// # Panics
    ///
    /// Panics if the write fails with an error. Policy denials are returned.
    pub async fn write(&self, agent_id: &AgentId, key: &str, value: Value) -> WriteOutcome {
        self.store
            .write(agent_id, key, value, Map::new())
            .await
            .expect("write should not error")
    }

    /// A reaper over the harness store.
    #[must_use]
    pub fn reaper(&self, config: ReaperConfig) -> RetentionReaper {
        RetentionReaper::new(self.store.clone(), config)
    }

    /// Number of audit events recorded for `agent_id`.
    ///
    /// # Panics
    ///
    /// Panics if the audit log cannot be read.
    #[must_use]
    pub fn audit_len(&self, agent_id: &AgentId) -> u64 {
        self.audit
            .event_count(agent_id)
            .expect("audit log should be readable")
    }
}

impl Default for GovernanceHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`GovernanceHarness`].
#[derive(Debug, Default)]
pub struct GovernanceHarnessBuilder {
    storage: Option<Arc<dyn AuditStorage>>,
    search: Option<Arc<dyn SearchProvider>>,
    config: StoreConfig,
}

impl GovernanceHarnessBuilder {
    /// Use a specific audit backend.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn AuditStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Attach a search provider.
    #[must_use]
    pub fn search(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(search);
        self
    }

    /// Bound lock waits.
    #[must_use]
    pub fn lock_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.lock_timeout = timeout;
        self
    }

    /// Wire everything together.
    #[must_use]
    pub fn build(self) -> GovernanceHarness {
        let clock = ManualClock::new(test_start_time());
        let dyn_clock: Arc<dyn Clock> = Arc::new(clock.clone());

        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryAuditStorage::default()));
        let audit = Arc::new(AuditLog::with_storage(storage, Arc::clone(&dyn_clock)));
        let registry = Arc::new(PolicyRegistry::new(Arc::clone(&dyn_clock)));

        let mut builder = GovernedStore::builder(
            Arc::clone(&registry) as Arc<dyn PolicySource>,
            Arc::clone(&audit),
        )
        .clock(dyn_clock)
        .config(self.config);
        if let Some(search) = self.search {
            builder = builder.search(search);
        }
        let store = builder.build();
        let checkpoints = CheckpointManager::new(store.clone());

        GovernanceHarness {
            clock,
            registry,
            audit,
            store,
            checkpoints,
        }
    }
}
