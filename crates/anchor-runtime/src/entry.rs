//! Stored entries.

use anchor_core::{AgentId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One key of one agent's store.
///
/// Entries are immutable once built: every write, delete or expiry replaces
/// the `Arc<Entry>` in the map, so snapshots that share the old map keep
/// seeing the old entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Owning agent.
    pub agent_id: AgentId,
    /// Key.
    pub key: String,
    /// Value as written.
    pub value: Value,
    /// Caller-supplied metadata.
    pub metadata: Map<String, Value>,
    /// First write of the key since it was last deleted.
    pub created_at: Timestamp,
    /// Most recent write.
    pub updated_at: Timestamp,
    /// When the entry stops being readable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
    /// Per-key write counter. Never reused for the same key.
    pub version: u64,
    /// Set when the entry was deleted or expired by the reaper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
}

impl Entry {
    /// Whether the entry is readable at `now`.
    #[must_use]
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.deleted_at.is_none() && !self.is_expired(now)
    }

    /// Whether the entry has passed its expiry at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| at.has_passed(now))
    }

    /// Whether the entry is a tombstone.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// A tombstoned copy of this entry.
    #[must_use]
    pub fn tombstoned(&self, at: Timestamp) -> Self {
        Self {
            deleted_at: Some(at),
            ..self.clone()
        }
    }
}
