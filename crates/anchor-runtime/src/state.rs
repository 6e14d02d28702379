//! Per-agent state and its serialization domain.
//!
//! Each agent owns one `tokio::sync::RwLock<AgentState>`. Every mutation of
//! the agent (write, delete, checkpoint, restore, reaper pass) runs under the
//! write side together with its audit append; readers take the read side.
//! Different agents never share a lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anchor_core::{AgentId, Timestamp};
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::warn;

use crate::checkpoint::StoredCheckpoint;
use crate::entry::Entry;
use crate::error::{RuntimeError, RuntimeResult};

/// An agent's entries, keyed and ordered by key.
///
/// A persistent map: cloning it for a checkpoint is O(1), and a later write
/// copies only the path to the changed key. Snapshots never change.
pub(crate) type EntryMap = im::OrdMap<String, Arc<Entry>>;

#[derive(Debug, Default)]
pub(crate) struct AgentState {
    /// Current entries, including tombstones not yet purged.
    pub(crate) entries: EntryMap,
    /// Highest version ever assigned per key. Survives delete, purge and
    /// restore, so versions never repeat.
    pub(crate) high_water: HashMap<String, u64>,
    /// Checkpoints, oldest first.
    pub(crate) checkpoints: Vec<StoredCheckpoint>,
    /// Bumped on every change to `entries`.
    pub(crate) generation: u64,
}

impl AgentState {
    /// Live entry for `key`, if any.
    pub(crate) fn live(&self, key: &str, now: Timestamp) -> Option<&Arc<Entry>> {
        self.entries.get(key).filter(|e| e.is_live(now))
    }

    /// Number of live entries.
    pub(crate) fn live_count(&self, now: Timestamp) -> u64 {
        count_live(&self.entries, now)
    }

    /// Version the next write of `key` gets.
    pub(crate) fn next_version(&self, key: &str) -> u64 {
        self.high_water
            .get(key)
            .copied()
            .unwrap_or(0)
            .saturating_add(1)
    }

    /// Insert or replace an entry.
    pub(crate) fn put(&mut self, entry: Entry) {
        let high = self.high_water.entry(entry.key.clone()).or_insert(0);
        *high = (*high).max(entry.version);
        self.entries.insert(entry.key.clone(), Arc::new(entry));
        self.bump();
    }

    /// Tombstone `keys` at `at` and drop `purged` outright, as one change.
    pub(crate) fn retire(&mut self, keys: &[String], purged: &[String], at: Timestamp) {
        if keys.is_empty() && purged.is_empty() {
            return;
        }
        for key in keys {
            if let Some(entry) = self.entries.get_mut(key.as_str()) {
                *entry = Arc::new(entry.tombstoned(at));
            }
        }
        for key in purged {
            self.entries.remove(key.as_str());
        }
        self.bump();
    }

    /// Replace the whole entry map.
    pub(crate) fn replace_entries(&mut self, entries: EntryMap) -> EntryMap {
        self.bump();
        std::mem::replace(&mut self.entries, entries)
    }

    pub(crate) fn bump(&mut self) {
        self.generation = self.generation.saturating_add(1);
    }
}

/// Live entries in a map.
pub(crate) fn count_live(entries: &EntryMap, now: Timestamp) -> u64 {
    let live = entries.values().filter(|e| e.is_live(now)).count();
    u64::try_from(live).unwrap_or(u64::MAX)
}

/// Live entries whose key starts with `prefix`, in key order.
pub(crate) fn live_with_prefix<'a>(
    entries: &'a EntryMap,
    prefix: &'a str,
    now: Timestamp,
) -> impl Iterator<Item = &'a Arc<Entry>> + 'a {
    entries
        .range::<_, str>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
        .take_while(move |(key, _)| key.starts_with(prefix))
        .map(|(_, entry)| entry)
        .filter(move |entry| entry.is_live(now))
}

/// All agent domains, created on first use.
#[derive(Debug)]
pub(crate) struct Domains {
    agents: DashMap<AgentId, Arc<RwLock<AgentState>>>,
    lock_timeout: Duration,
}

impl Domains {
    pub(crate) fn new(lock_timeout: Duration) -> Self {
        Self {
            agents: DashMap::new(),
            lock_timeout,
        }
    }

    /// Domain of `agent_id`, created on first use. Only mutations call this,
    /// so reads never register an agent.
    fn domain(&self, agent_id: &AgentId) -> Arc<RwLock<AgentState>> {
        if let Some(domain) = self.agents.get(agent_id) {
            return Arc::clone(domain.value());
        }
        Arc::clone(self.agents.entry(agent_id.clone()).or_default().value())
    }

    fn timeout_error(&self, agent_id: &AgentId) -> RuntimeError {
        let timeout_ms = u64::try_from(self.lock_timeout.as_millis()).unwrap_or(u64::MAX);
        warn!(agent_id = %agent_id, timeout_ms, "Timed out waiting for agent lock");
        RuntimeError::ConcurrencyTimeout {
            agent_id: agent_id.to_string(),
            timeout_ms,
        }
    }

    /// Enter the agent's exclusive section.
    pub(crate) async fn write(
        &self,
        agent_id: &AgentId,
    ) -> RuntimeResult<OwnedRwLockWriteGuard<AgentState>> {
        tokio::time::timeout(self.lock_timeout, self.domain(agent_id).write_owned())
            .await
            .map_err(|_| self.timeout_error(agent_id))
    }

    /// Enter the agent's shared section.
    ///
    /// An agent that was never written reads as empty state, without
    /// creating a domain for it.
    pub(crate) async fn read(
        &self,
        agent_id: &AgentId,
    ) -> RuntimeResult<OwnedRwLockReadGuard<AgentState>> {
        let domain = self
            .agents
            .get(agent_id)
            .map_or_else(Arc::default, |domain| Arc::clone(domain.value()));
        tokio::time::timeout(self.lock_timeout, domain.read_owned())
            .await
            .map_err(|_| self.timeout_error(agent_id))
    }

    /// Agents that have been touched since startup.
    pub(crate) fn agent_ids(&self) -> Vec<AgentId> {
        let mut ids: Vec<_> = self.agents.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::{Map, Value};

    fn now() -> Timestamp {
        Timestamp(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    fn entry(key: &str, version: u64) -> Entry {
        Entry {
            agent_id: AgentId::new("agent_1").unwrap(),
            key: key.into(),
            value: Value::from(version),
            metadata: Map::new(),
            created_at: now(),
            updated_at: now(),
            expires_at: None,
            version,
            deleted_at: None,
        }
    }

    #[test]
    fn test_snapshot_survives_put() {
        let mut state = AgentState::default();
        state.put(entry("a", 1));
        let snapshot = state.entries.clone();
        assert!(snapshot.ptr_eq(&state.entries));

        state.put(entry("a", 2));
        state.put(entry("b", 1));
        assert!(!snapshot.ptr_eq(&state.entries));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["a"].version, 1);
        assert_eq!(state.entries["a"].version, 2);
        assert_eq!(state.live_count(now()), 2);
    }

    #[test]
    fn test_high_water_survives_replace() {
        let mut state = AgentState::default();
        state.put(entry("a", 1));
        let old = state.entries.clone();
        state.put(entry("a", 2));

        state.replace_entries(old);
        assert_eq!(state.entries["a"].version, 1);
        assert_eq!(state.next_version("a"), 3);
        assert_eq!(state.next_version("never"), 1);
    }

    #[test]
    fn test_prefix_scan() {
        let mut state = AgentState::default();
        for key in ["temp:1", "temp:2", "tempo", "keep:1"] {
            state.put(entry(key, 1));
        }
        let keys: Vec<_> = live_with_prefix(&state.entries, "temp:", now())
            .map(|e| e.key.as_str())
            .collect();
        assert_eq!(keys, ["temp:1", "temp:2"]);
    }

    #[test]
    fn test_retire_tombstones_and_purges() {
        let mut state = AgentState::default();
        state.put(entry("a", 1));
        state.put(entry("b", 1));
        let before = state.generation;

        state.retire(&["a".to_owned()], &["b".to_owned()], now());
        assert!(state.entries["a"].is_tombstone());
        assert!(!state.entries.contains_key("b"));
        assert!(state.generation > before);

        let unchanged = state.generation;
        state.retire(&[], &[], now());
        assert_eq!(state.generation, unchanged);
    }

    #[tokio::test]
    async fn test_write_lock_times_out() {
        let domains = Domains::new(Duration::from_millis(20));
        let agent = AgentId::new("agent_1").unwrap();
        let _held = domains.write(&agent).await.unwrap();

        let err = domains.write(&agent).await.unwrap_err();
        assert!(matches!(err, RuntimeError::ConcurrencyTimeout { timeout_ms: 20, .. }));
        assert!(domains.read(&agent).await.is_err());
    }

    #[test]
    fn test_retire_leaves_snapshot_intact() {
        let mut state = AgentState::default();
        for i in 0..1_000u64 {
            state.put(entry(&format!("k{i:04}"), 1));
        }
        let snapshot = state.entries.clone();

        state.retire(&["k0001".to_owned()], &["k0002".to_owned()], now());
        assert_eq!(snapshot.len(), 1_000);
        assert!(!snapshot["k0001"].is_tombstone());
        assert!(snapshot.contains_key("k0002"));
        assert!(Arc::ptr_eq(&snapshot["k0500"], &state.entries["k0500"]));
    }

    #[tokio::test]
    async fn test_reads_do_not_register_agents() {
        let domains = Domains::new(Duration::from_millis(20));
        let agent = AgentId::new("agent_1").unwrap();

        let state = domains.read(&agent).await.unwrap();
        assert!(state.entries.is_empty());
        assert_eq!(state.next_version("k"), 1);
        drop(state);
        assert!(domains.agent_ids().is_empty());

        drop(domains.write(&agent).await.unwrap());
        assert_eq!(domains.agent_ids(), vec![agent]);
    }

    #[tokio::test]
    async fn test_agents_do_not_share_locks() {
        let domains = Domains::new(Duration::from_millis(20));
        let _held = domains.write(&AgentId::new("a").unwrap()).await.unwrap();
        assert!(domains.write(&AgentId::new("b").unwrap()).await.is_ok());
        assert_eq!(domains.agent_ids().len(), 2);
    }
}
