//! The governed key/value store.
//!
//! Every mutation runs inside the agent's exclusive section in three steps:
//! evaluate policy against the current state, append the audit event, then
//! apply the change. If the append fails nothing is applied, so the store
//! never holds data the audit chain does not account for.

use std::sync::Arc;
use std::time::Duration;

use anchor_audit::{AuditEventId, AuditLog, AuditOperation, AuditOutcome, AuditRecord};
use anchor_core::{AgentId, Clock, SystemClock, Timestamp};
use anchor_policy::{
    CompiledPolicy, PolicyEngine, PolicySource, ReasonCode, WriteRequest, value_size,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::entry::Entry;
use crate::error::{RuntimeError, RuntimeResult};
use crate::search::{SearchHit, SearchProvider};
use crate::state::{AgentState, Domains, live_with_prefix};

/// Longest accepted key, in bytes.
pub const MAX_KEY_LEN: usize = 1024;

/// Default bound on waiting for an agent's section.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Store tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// How long an operation waits for the agent's section before failing
    /// with [`RuntimeError::ConcurrencyTimeout`].
    pub lock_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// Result of a governed write, as surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    /// Key the write targeted.
    pub key: String,
    /// Whether the write was committed.
    pub allowed: bool,
    /// Audit event recording the attempt.
    pub audit_id: AuditEventId,
    /// Why the write was denied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
    /// Rule, prefix or pattern that denied the write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    /// Version of the committed entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Expiry of the committed entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
}

/// Result of a single-key delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    /// Whether a live entry was removed.
    pub existed: bool,
    /// Audit event recording the delete.
    pub audit_id: AuditEventId,
}

/// Result of a prefix delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixDeleteOutcome {
    /// Live entries removed.
    pub count: u64,
    /// Audit event recording the delete.
    pub audit_id: AuditEventId,
}

#[derive(Debug)]
pub(crate) struct StoreInner {
    pub(crate) domains: Domains,
    pub(crate) policies: Arc<dyn PolicySource>,
    pub(crate) audit: Arc<AuditLog>,
    pub(crate) clock: Arc<dyn Clock>,
    search: Option<Arc<dyn SearchProvider>>,
}

/// Per-agent key/value store whose writes must pass policy.
///
/// Cheap to clone; clones share the same state.
#[derive(Debug, Clone)]
pub struct GovernedStore {
    pub(crate) inner: Arc<StoreInner>,
}

/// Builder for [`GovernedStore`].
#[derive(Debug)]
pub struct GovernedStoreBuilder {
    policies: Arc<dyn PolicySource>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
    search: Option<Arc<dyn SearchProvider>>,
}

impl GovernedStoreBuilder {
    /// Use a specific time source. Defaults to [`SystemClock`].
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the store configuration.
    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Attach a search collaborator.
    #[must_use]
    pub fn search(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(provider);
        self
    }

    /// Build the store.
    #[must_use]
    pub fn build(self) -> GovernedStore {
        GovernedStore {
            inner: Arc::new(StoreInner {
                domains: Domains::new(self.config.lock_timeout),
                policies: self.policies,
                audit: self.audit,
                clock: self.clock,
                search: self.search,
            }),
        }
    }
}

/// One item of a write, before evaluation.
struct PendingWrite {
    key: String,
    value: Value,
    metadata: Map<String, Value>,
}

fn validate_key(key: &str) -> RuntimeResult<()> {
    let reason = if key.is_empty() {
        "must not be empty"
    } else if key.len() > MAX_KEY_LEN {
        "longer than 1024 bytes"
    } else if key.chars().any(char::is_control) {
        "contains control characters"
    } else {
        return Ok(());
    };
    Err(RuntimeError::InvalidKey {
        key: key.to_owned(),
        reason,
    })
}

impl GovernedStore {
    /// Start building a store over a policy source and an audit log.
    #[must_use]
    pub fn builder(policies: Arc<dyn PolicySource>, audit: Arc<AuditLog>) -> GovernedStoreBuilder {
        GovernedStoreBuilder {
            policies,
            audit,
            clock: Arc::new(SystemClock),
            config: StoreConfig::default(),
            search: None,
        }
    }

    /// The audit log this store appends to.
    #[must_use]
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.inner.audit
    }

    /// The store's time source.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// Agents with at least one mutation attempted since the store was built.
    /// Reads never register an agent.
    #[must_use]
    pub fn agents(&self) -> Vec<AgentId> {
        self.inner.domains.agent_ids()
    }

    /// Evaluate, audit and apply one write while holding the agent's section.
    fn apply_write(
        &self,
        state: &mut AgentState,
        policy: &CompiledPolicy,
        agent_id: &AgentId,
        write: PendingWrite,
        now: Timestamp,
    ) -> RuntimeResult<WriteOutcome> {
        let PendingWrite {
            key,
            value,
            metadata,
        } = write;
        let existing = state.live(&key, now).cloned();
        let live_key_count = if policy.config().max_keys_per_agent.is_some() {
            state.live_count(now)
        } else {
            0
        };

        let decision = PolicyEngine::evaluate(
            &WriteRequest {
                agent_id,
                key: &key,
                value: &value,
                metadata: &metadata,
                key_exists: existing.is_some(),
                live_key_count,
                now,
            },
            policy,
        );

        if decision.is_denied() {
            let code = decision.reason.as_ref().map(ReasonCode::as_code);
            let mut record =
                AuditRecord::new(AuditOperation::DataWrite, &key, AuditOutcome::Denied).at(now);
            if let Some(code) = &code {
                record = record.meta("reason", code.as_str());
            }
            if let Some(rule) = &decision.matched_rule {
                record = record.meta("matched_rule", rule.as_str());
            }
            let event = self.inner.audit.append(agent_id, record)?;

            warn!(
                agent_id = %agent_id,
                key = %key,
                reason = code.as_deref().unwrap_or_default(),
                "Write denied by policy"
            );
            return Ok(WriteOutcome {
                key,
                allowed: false,
                audit_id: event.id,
                reason: decision.reason,
                matched_rule: decision.matched_rule,
                version: None,
                expires_at: None,
            });
        }

        let version = state.next_version(&key);
        let size = u64::try_from(value_size(&value)).unwrap_or(u64::MAX);
        let mut record = AuditRecord::new(AuditOperation::DataWrite, &key, AuditOutcome::Allowed)
            .meta("version", version)
            .meta("value_bytes", size)
            .at(now);
        if let Some(expires_at) = decision.expires_at {
            record = record.meta("expires_at", expires_at.to_string());
        }
        let event = self.inner.audit.append(agent_id, record)?;

        state.put(Entry {
            agent_id: agent_id.clone(),
            key: key.clone(),
            value,
            metadata,
            created_at: existing.map_or(now, |e| e.created_at),
            updated_at: now,
            expires_at: decision.expires_at,
            version,
            deleted_at: None,
        });

        debug!(agent_id = %agent_id, key = %key, version, "Write committed");
        Ok(WriteOutcome {
            key,
            allowed: true,
            audit_id: event.id,
            reason: None,
            matched_rule: None,
            version: Some(version),
            expires_at: decision.expires_at,
        })
    }

    /// Governed write of one key.
    ///
    /// A denied write is returned as an outcome with `allowed == false`; the
    /// previous value (or absence) is left untouched. Either way exactly one
    /// audit event is appended.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid, the agent's section cannot be
    /// entered in time, or the audit append fails. Nothing is changed in any
    /// of these cases.
    #[instrument(skip_all, fields(agent_id = %agent_id, key = %key))]
    pub async fn write(
        &self,
        agent_id: &AgentId,
        key: &str,
        value: Value,
        metadata: Map<String, Value>,
    ) -> RuntimeResult<WriteOutcome> {
        validate_key(key)?;
        let mut state = self.inner.domains.write(agent_id).await?;
        let policy = self.inner.policies.current(agent_id)?;
        let now = self.inner.clock.now();
        let write = PendingWrite {
            key: key.to_owned(),
            value,
            metadata,
        };
        self.apply_write(&mut state, &policy, agent_id, write, now)
    }

    /// Governed write of several keys, in input order.
    ///
    /// Each item is evaluated and audited on its own, so one denial does not
    /// block the others. Items later in the batch see the effect of earlier
    /// ones (for `max_keys_per_agent` in particular).
    ///
    /// # Errors
    ///
    /// Returns an error before anything is written if any key is invalid.
    /// An audit failure stops the batch; items before it stay committed.
    #[instrument(skip_all, fields(agent_id = %agent_id))]
    pub async fn write_batch<K>(
        &self,
        agent_id: &AgentId,
        items: impl IntoIterator<Item = (K, Value)>,
    ) -> RuntimeResult<Vec<WriteOutcome>>
    where
        K: Into<String>,
    {
        let items: Vec<(String, Value)> = items.into_iter().map(|(k, v)| (k.into(), v)).collect();
        for (key, _) in &items {
            validate_key(key)?;
        }

        let mut state = self.inner.domains.write(agent_id).await?;
        let policy = self.inner.policies.current(agent_id)?;
        let now = self.inner.clock.now();

        let mut outcomes = Vec::with_capacity(items.len());
        for (key, value) in items {
            let write = PendingWrite {
                key,
                value,
                metadata: Map::new(),
            };
            outcomes.push(self.apply_write(&mut state, &policy, agent_id, write, now)?);
        }
        debug!(agent_id = %agent_id, items = outcomes.len(), "Batch written");
        Ok(outcomes)
    }

    /// Current value of a live key.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotFound`] if the key is absent, deleted or
    /// expired.
    pub async fn read(&self, agent_id: &AgentId, key: &str) -> RuntimeResult<Value> {
        self.read_full(agent_id, key).await.map(|entry| entry.value)
    }

    /// Current entry of a live key, with metadata and timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotFound`] if the key is absent, deleted or
    /// expired.
    pub async fn read_full(&self, agent_id: &AgentId, key: &str) -> RuntimeResult<Entry> {
        let state = self.inner.domains.read(agent_id).await?;
        let now = self.inner.clock.now();
        state
            .live(key, now)
            .map(|entry| entry.as_ref().clone())
            .ok_or_else(|| RuntimeError::NotFound {
                agent_id: agent_id.to_string(),
                key: key.to_owned(),
            })
    }

    /// Delete one key.
    ///
    /// Always allowed and always audited. Deleting a key that is not live
    /// succeeds without changing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid, the agent's section cannot be
    /// entered in time, or the audit append fails.
    #[instrument(skip_all, fields(agent_id = %agent_id, key = %key))]
    pub async fn delete(&self, agent_id: &AgentId, key: &str) -> RuntimeResult<DeleteOutcome> {
        validate_key(key)?;
        let mut state = self.inner.domains.write(agent_id).await?;
        let now = self.inner.clock.now();

        let existing = state.live(key, now).map(|e| e.version);
        let mut record = AuditRecord::new(AuditOperation::DataDelete, key, AuditOutcome::Success)
            .meta("existed", existing.is_some())
            .at(now);
        if let Some(version) = existing {
            record = record.meta("version", version);
        }
        let event = self.inner.audit.append(agent_id, record)?;

        if existing.is_some() {
            state.retire(&[key.to_owned()], &[], now);
        }
        debug!(agent_id = %agent_id, key = %key, existed = existing.is_some(), "Key deleted");
        Ok(DeleteOutcome {
            existed: existing.is_some(),
            audit_id: event.id,
        })
    }

    /// Delete every live key starting with `prefix`, as one change.
    ///
    /// Readers see either all matching keys or none of them.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidKey`] for an empty prefix, and the
    /// errors of [`GovernedStore::delete`] otherwise.
    #[instrument(skip_all, fields(agent_id = %agent_id, prefix = %prefix))]
    pub async fn delete_prefix(
        &self,
        agent_id: &AgentId,
        prefix: &str,
    ) -> RuntimeResult<PrefixDeleteOutcome> {
        validate_key(prefix)?;
        let mut state = self.inner.domains.write(agent_id).await?;
        let now = self.inner.clock.now();

        let keys: Vec<String> = live_with_prefix(&state.entries, prefix, now)
            .map(|entry| entry.key.clone())
            .collect();
        let count = u64::try_from(keys.len()).unwrap_or(u64::MAX);

        let record =
            AuditRecord::new(AuditOperation::DataDeletePrefix, prefix, AuditOutcome::Success)
                .meta("count", count)
                .at(now);
        let event = self.inner.audit.append(agent_id, record)?;

        state.retire(&keys, &[], now);
        debug!(agent_id = %agent_id, prefix = %prefix, count, "Prefix deleted");
        Ok(PrefixDeleteOutcome {
            count,
            audit_id: event.id,
        })
    }

    /// Live keys in key order, optionally restricted to a prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent's section cannot be entered in time.
    pub async fn list(&self, agent_id: &AgentId, prefix: Option<&str>) -> RuntimeResult<Vec<String>> {
        let state = self.inner.domains.read(agent_id).await?;
        let now = self.inner.clock.now();
        Ok(live_with_prefix(&state.entries, prefix.unwrap_or_default(), now)
            .map(|entry| entry.key.clone())
            .collect())
    }

    /// Number of live keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent's section cannot be entered in time.
    pub async fn count(&self, agent_id: &AgentId) -> RuntimeResult<u64> {
        let state = self.inner.domains.read(agent_id).await?;
        Ok(state.live_count(self.inner.clock.now()))
    }

    /// Ask the search collaborator for keys matching `query`.
    ///
    /// Hits for keys that are not live are dropped and the remaining hits
    /// carry the current stored value.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::SearchUnavailable`] when no provider is
    /// attached and [`RuntimeError::Search`] when it fails.
    #[instrument(skip_all, fields(agent_id = %agent_id, limit = limit))]
    pub async fn search(
        &self,
        agent_id: &AgentId,
        query: &str,
        limit: usize,
    ) -> RuntimeResult<Vec<SearchHit>> {
        let provider = self
            .inner
            .search
            .as_ref()
            .ok_or(RuntimeError::SearchUnavailable)?;
        let hits = provider
            .search(agent_id, query, limit)
            .await
            .map_err(RuntimeError::Search)?;

        let state = self.inner.domains.read(agent_id).await?;
        let now = self.inner.clock.now();
        let found = hits.len();
        let hits: Vec<SearchHit> = hits
            .into_iter()
            .filter_map(|hit| {
                state.live(&hit.key, now).map(|entry| SearchHit {
                    value: entry.value.clone(),
                    ..hit
                })
            })
            .take(limit)
            .collect();
        debug!(agent_id = %agent_id, found, kept = hits.len(), "Search filtered");
        Ok(hits)
    }
}
