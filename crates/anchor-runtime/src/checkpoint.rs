//! Checkpoints of an agent's entries.
//!
//! A checkpoint shares the agent's entry map at the instant it is taken.
//! Later writes copy the map before changing it, so the checkpoint keeps
//! seeing exactly what was there. Restoring swaps the shared map back in.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anchor_audit::{AuditEventId, AuditOperation, AuditOutcome, AuditRecord};
use anchor_core::{AgentId, Timestamp};
use anchor_crypto::ContentHash;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{RuntimeError, RuntimeResult};
use crate::state::{EntryMap, count_live};
use crate::store::GovernedStore;

/// Unique identifier of a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(pub Uuid);

impl CheckpointId {
    /// Create a new random checkpoint id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CheckpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CheckpointId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Which state of the agent's entry map a checkpoint shares.
///
/// The agent's change counter at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotRef(pub u64);

impl fmt::Display for SnapshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// A named, immutable snapshot of one agent's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint id.
    pub id: CheckpointId,
    /// Owning agent.
    pub agent_id: AgentId,
    /// Short name.
    pub label: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When it was taken.
    pub created_at: Timestamp,
    /// The shared entry map.
    pub snapshot_ref: SnapshotRef,
    /// Live entries at creation time.
    pub entry_count: u64,
    /// Audit chain head at creation time.
    pub audit_head: ContentHash,
}

/// A checkpoint together with the entries it shares.
#[derive(Debug, Clone)]
pub(crate) struct StoredCheckpoint {
    pub(crate) meta: Checkpoint,
    pub(crate) snapshot: EntryMap,
}

/// Result of a restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOutcome {
    /// Checkpoint the agent was restored to.
    pub restored_from: CheckpointId,
    /// Live entries after the restore.
    pub data_keys_restored: u64,
    /// The `checkpoint.restore` audit event.
    pub audit_id: AuditEventId,
}

/// Creates, lists and restores checkpoints of a [`GovernedStore`].
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    store: GovernedStore,
}

impl CheckpointManager {
    /// Manage checkpoints of `store`.
    #[must_use]
    pub fn new(store: GovernedStore) -> Self {
        Self { store }
    }

    /// Take a checkpoint of the agent's current entries.
    ///
    /// Taken inside the agent's exclusive section, so the snapshot and the
    /// recorded audit head describe the same instant.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent's section cannot be entered in time or
    /// the audit head cannot be read.
    #[instrument(skip_all, fields(agent_id = %agent_id, label = %label))]
    pub async fn create(
        &self,
        agent_id: &AgentId,
        label: &str,
        description: Option<&str>,
    ) -> RuntimeResult<Checkpoint> {
        let inner = &self.store.inner;
        let mut state = inner.domains.write(agent_id).await?;
        let now = inner.clock.now();

        let snapshot = state.entries.clone();
        let meta = Checkpoint {
            id: CheckpointId::new(),
            agent_id: agent_id.clone(),
            label: label.to_owned(),
            description: description.map(str::to_owned),
            created_at: now,
            snapshot_ref: SnapshotRef(state.generation),
            entry_count: count_live(&snapshot, now),
            audit_head: inner.audit.head(agent_id)?,
        };
        state.checkpoints.push(StoredCheckpoint {
            meta: meta.clone(),
            snapshot,
        });

        info!(
            agent_id = %agent_id,
            checkpoint_id = %meta.id,
            entries = meta.entry_count,
            snapshot = %meta.snapshot_ref,
            "Checkpoint created"
        );
        Ok(meta)
    }

    /// Every checkpoint of the agent, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent's section cannot be entered in time.
    pub async fn list(&self, agent_id: &AgentId) -> RuntimeResult<Vec<Checkpoint>> {
        let state = self.store.inner.domains.read(agent_id).await?;
        Ok(state.checkpoints.iter().map(|c| c.meta.clone()).collect())
    }

    /// One checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::CheckpointNotFound`] if the agent has no such
    /// checkpoint.
    pub async fn get(&self, agent_id: &AgentId, id: CheckpointId) -> RuntimeResult<Checkpoint> {
        let state = self.store.inner.domains.read(agent_id).await?;
        state
            .checkpoints
            .iter()
            .find(|c| c.meta.id == id)
            .map(|c| c.meta.clone())
            .ok_or_else(|| not_found(agent_id, id))
    }

    /// Replace the agent's entries with a checkpoint's.
    ///
    /// All-or-nothing: if the `checkpoint.restore` event cannot be appended
    /// the agent's entries are left as they were. Per-key versions keep
    /// counting from their highest value, and newer checkpoints are kept.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::CheckpointNotFound`] for an unknown id, and an
    /// error if the section cannot be entered in time or the audit append
    /// fails.
    #[instrument(skip_all, fields(agent_id = %agent_id, checkpoint_id = %id))]
    pub async fn restore(&self, agent_id: &AgentId, id: CheckpointId) -> RuntimeResult<RestoreOutcome> {
        let inner = &self.store.inner;
        let mut state = inner.domains.write(agent_id).await?;
        let now = inner.clock.now();

        let checkpoint = state
            .checkpoints
            .iter()
            .find(|c| c.meta.id == id)
            .cloned()
            .ok_or_else(|| not_found(agent_id, id))?;

        let pre_restore_entry_count = state.live_count(now);
        let pre_restore_audit_head = inner.audit.head(agent_id)?;
        let previous = state.replace_entries(checkpoint.snapshot.clone());
        let data_keys_restored = state.live_count(now);

        let record = AuditRecord::new(
            AuditOperation::CheckpointRestore,
            id.to_string(),
            AuditOutcome::Success,
        )
        .meta("checkpoint_id", id.to_string())
        .meta("label", checkpoint.meta.label.as_str())
        .meta("snapshot_ref", checkpoint.meta.snapshot_ref.to_string())
        .meta("pre_restore_audit_head", pre_restore_audit_head.to_hex())
        .meta("pre_restore_entry_count", pre_restore_entry_count)
        .meta("data_keys_restored", data_keys_restored)
        .at(now);

        let event = match inner.audit.append(agent_id, record) {
            Ok(event) => event,
            Err(e) => {
                state.replace_entries(previous);
                return Err(e.into());
            },
        };

        info!(
            agent_id = %agent_id,
            checkpoint_id = %id,
            restored = data_keys_restored,
            replaced = pre_restore_entry_count,
            "Checkpoint restored"
        );
        Ok(RestoreOutcome {
            restored_from: id,
            data_keys_restored,
            audit_id: event.id,
        })
    }
}

fn not_found(agent_id: &AgentId, id: CheckpointId) -> RuntimeError {
    RuntimeError::CheckpointNotFound {
        agent_id: agent_id.to_string(),
        checkpoint_id: id.to_string(),
    }
}
