//! Audit log - main interface for audit logging.
//!
//! Provides a high-level API for recording, querying, verifying and
//! exporting per-agent audit chains.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anchor_core::{AgentId, Clock};
use anchor_crypto::ContentHash;
use dashmap::DashMap;
use tracing::{debug, error, info};

use crate::error::{AuditError, AuditResult};
use crate::event::{AuditEvent, AuditRecord};
use crate::export::AuditExport;
use crate::query::AuditQuery;
use crate::storage::{AuditStorage, FileAuditStorage, MemoryAuditStorage};
use crate::verify::{ChainIssue, ChainVerification, verify_events};

/// Tip of one agent's chain.
#[derive(Debug, Clone, Copy)]
struct ChainHead {
    hash: ContentHash,
    next_sequence: u64,
}

impl ChainHead {
    fn from_events(events: &[AuditEvent]) -> Self {
        events.last().map_or(
            Self {
                hash: ContentHash::genesis(),
                next_sequence: 0,
            },
            |last| Self {
                hash: last.hash,
                next_sequence: last.sequence.saturating_add(1),
            },
        )
    }
}

/// Audit log for recording and verifying governed operations.
///
/// Appends for one agent are serialized by a per-agent head lock; different
/// agents append in parallel.
#[derive(Debug)]
pub struct AuditLog {
    /// Storage backend.
    storage: Arc<dyn AuditStorage>,
    /// Current chain heads per agent (loaded lazily from storage).
    heads: DashMap<AgentId, Arc<Mutex<ChainHead>>>,
    /// Time source for events without an explicit timestamp.
    clock: Arc<dyn Clock>,
}

impl AuditLog {
    /// Create an audit log over a storage backend.
    #[must_use]
    pub fn with_storage(storage: Arc<dyn AuditStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            heads: DashMap::new(),
            clock,
        }
    }

    /// Create an in-memory audit log.
    #[must_use]
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::with_storage(Arc::new(MemoryAuditStorage::new()), clock)
    }

    /// Open a JSONL-backed audit log and verify every stored chain.
    ///
    /// A chain that fails verification is reported and left as is. It keeps
    /// failing [`AuditLog::verify`] until someone investigates.
    ///
    /// A file that cannot be parsed is logged and skipped, so one damaged
    /// agent does not keep the others from opening. Operations on that agent
    /// keep returning the parse error.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be opened or listed.
    pub fn open(dir: impl AsRef<Path>, clock: Arc<dyn Clock>) -> AuditResult<Self> {
        let storage = FileAuditStorage::open(dir)?;
        let log = Self::with_storage(Arc::new(storage), clock);

        for agent_id in log.storage.agents()? {
            let events = match log.storage.load(&agent_id) {
                Ok(events) => events,
                Err(e) => {
                    error!(agent_id = %agent_id, error = %e, "Failed to load audit chain");
                    continue;
                },
            };
            let verification = verify_events(&events);
            if verification.valid {
                debug!(agent_id = %agent_id, events = events.len(), "Audit chain reloaded");
            } else {
                error!(
                    agent_id = %agent_id,
                    first_invalid = ?verification.first_invalid,
                    "Reloaded audit chain failed verification"
                );
            }
            log.heads
                .insert(agent_id, Arc::new(Mutex::new(ChainHead::from_events(&events))));
        }
        Ok(log)
    }

    fn head_lock(&self, agent_id: &AgentId) -> AuditResult<Arc<Mutex<ChainHead>>> {
        if let Some(head) = self.heads.get(agent_id) {
            return Ok(Arc::clone(head.value()));
        }
        let events = self.storage.load(agent_id)?;
        Ok(Arc::clone(
            self.heads
                .entry(agent_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(ChainHead::from_events(&events))))
                .value(),
        ))
    }

    /// Append an event to an agent's chain.
    ///
    /// The head advances only after storage accepted the event; on error the
    /// chain is exactly as before.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized or stored.
    pub fn append(&self, agent_id: &AgentId, record: AuditRecord) -> AuditResult<AuditEvent> {
        let head = self.head_lock(agent_id)?;
        let mut head = head
            .lock()
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        let event = AuditEvent::seal(
            agent_id.clone(),
            head.next_sequence,
            record,
            self.clock.now(),
            head.hash,
        )?;

        debug!(
            agent_id = %agent_id,
            event_id = %event.id,
            sequence = event.sequence,
            operation = %event.operation,
            result = %event.result,
            "Appending audit event"
        );

        self.storage.append(&event)?;

        head.hash = event.hash;
        head.next_sequence = event.sequence.saturating_add(1);
        Ok(event)
    }

    /// Hash of the most recent event, or genesis for an empty chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain cannot be loaded.
    pub fn head(&self, agent_id: &AgentId) -> AuditResult<ContentHash> {
        let head = self.head_lock(agent_id)?;
        let head = head
            .lock()
            .map_err(|e| AuditError::Storage(e.to_string()))?;
        Ok(head.hash)
    }

    /// Number of events in an agent's chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the chain cannot be loaded.
    pub fn event_count(&self, agent_id: &AgentId) -> AuditResult<u64> {
        let head = self.head_lock(agent_id)?;
        let head = head
            .lock()
            .map_err(|e| AuditError::Storage(e.to_string()))?;
        Ok(head.next_sequence)
    }

    /// All events of an agent, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub fn events(&self, agent_id: &AgentId) -> AuditResult<Vec<AuditEvent>> {
        self.storage.load(agent_id)
    }

    /// Events matching `query`, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub fn query(&self, agent_id: &AgentId, query: &AuditQuery) -> AuditResult<Vec<AuditEvent>> {
        Ok(query.apply(&self.storage.load(agent_id)?))
    }

    /// Verify the integrity of an agent's chain as stored.
    ///
    /// # Errors
    ///
    /// Returns an error if events cannot be retrieved. An invalid chain is
    /// not an error here; see [`ChainVerification::into_result`].
    pub fn verify(&self, agent_id: &AgentId) -> AuditResult<ChainVerification> {
        let events = self.storage.load(agent_id)?;
        let mut result = verify_events(&events);
        result.agent_id = Some(agent_id.clone());
        Ok(result)
    }

    /// Verify every agent's chain.
    ///
    /// A chain whose file cannot be parsed is reported as invalid with
    /// [`ChainIssue::Unreadable`] instead of failing the whole sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if agents cannot be listed or a file cannot be read.
    pub fn verify_all(&self) -> AuditResult<Vec<ChainVerification>> {
        self.storage
            .agents()?
            .iter()
            .map(|agent_id| match self.verify(agent_id) {
                Err(AuditError::Serialization(message)) => Ok(ChainVerification {
                    agent_id: Some(agent_id.clone()),
                    valid: false,
                    events_checked: 0,
                    first_invalid: None,
                    issue: Some(ChainIssue::Unreadable { message }),
                }),
                other => other,
            })
            .collect()
    }

    /// Snapshot an agent's chain for export.
    ///
    /// # Errors
    ///
    /// Returns an error if events cannot be retrieved.
    pub fn export(&self, agent_id: &AgentId, include_verification: bool) -> AuditResult<AuditExport> {
        let events = self.storage.load(agent_id)?;
        let verification = include_verification.then(|| {
            let mut result = verify_events(&events);
            result.agent_id = Some(agent_id.clone());
            result
        });

        info!(
            agent_id = %agent_id,
            events = events.len(),
            include_verification,
            "Exporting audit chain"
        );

        Ok(AuditExport {
            agent_id: agent_id.clone(),
            exported_at: self.clock.now(),
            events,
            verification,
        })
    }

    /// Agents with at least one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails.
    pub fn agents(&self) -> AuditResult<Vec<AgentId>> {
        self.storage.agents()
    }

    /// Flush pending writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend fails to flush.
    pub fn flush(&self) -> AuditResult<()> {
        self.storage.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AuditOperation, AuditOutcome};
    use crate::export::{ExportFormat, parse_export};
    use anchor_core::ManualClock;
    use chrono::{Duration, TimeZone, Utc};
    use std::io::Write;

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    fn agent(id: &str) -> AgentId {
        AgentId::new(id).unwrap()
    }

    fn write(resource: &str) -> AuditRecord {
        AuditRecord::new(AuditOperation::DataWrite, resource, AuditOutcome::Allowed)
    }

    #[test]
    fn test_append_links_events() {
        let log = AuditLog::in_memory(Arc::new(clock()));
        let a = agent("agent_1");
        assert!(log.head(&a).unwrap().is_genesis());

        let first = log.append(&a, write("k1")).unwrap();
        let second = log.append(&a, write("k2")).unwrap();

        assert_eq!(first.sequence, 0);
        assert!(first.previous_hash.is_genesis());
        assert!(second.follows(&first));
        assert_eq!(log.head(&a).unwrap(), second.hash);
        assert_eq!(log.event_count(&a).unwrap(), 2);
    }

    #[test]
    fn test_chains_are_per_agent() {
        let log = AuditLog::in_memory(Arc::new(clock()));
        log.append(&agent("a"), write("k")).unwrap();
        let b = log.append(&agent("b"), write("k")).unwrap();
        assert_eq!(b.sequence, 0);
        assert!(b.previous_hash.is_genesis());
        assert_eq!(log.agents().unwrap().len(), 2);
    }

    #[test]
    fn test_verify_counts_events() {
        let log = AuditLog::in_memory(Arc::new(clock()));
        let a = agent("agent_1");
        for i in 0..7 {
            log.append(&a, write(&format!("k{i}"))).unwrap();
        }
        let result = log.verify(&a).unwrap();
        assert!(result.valid);
        assert_eq!(result.events_checked, 7);
        assert_eq!(result.agent_id, Some(a));
    }

    #[test]
    fn test_events_use_clock_time() {
        let clock = clock();
        let log = AuditLog::in_memory(Arc::new(clock.clone()));
        let a = agent("agent_1");
        let first = log.append(&a, write("k")).unwrap();
        clock.advance(Duration::hours(1));
        let second = log.append(&a, write("k")).unwrap();
        assert_eq!(second.timestamp, first.timestamp.plus(Duration::hours(1)));
    }

    #[test]
    fn test_query_most_recent_first() {
        let log = AuditLog::in_memory(Arc::new(clock()));
        let a = agent("agent_1");
        log.append(&a, write("user:1")).unwrap();
        log.append(
            &a,
            AuditRecord::new(AuditOperation::DataDelete, "user:1", AuditOutcome::Success),
        )
        .unwrap();
        log.append(&a, write("user:2")).unwrap();

        let found = log
            .query(&a, &AuditQuery::new().operations([AuditOperation::DataWrite]))
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].resource, "user:2");
    }

    #[test]
    fn test_export_includes_verification() {
        let log = AuditLog::in_memory(Arc::new(clock()));
        let a = agent("agent_1");
        log.append(&a, write("k")).unwrap();

        let export = log.export(&a, true).unwrap();
        assert_eq!(export.events.len(), 1);
        assert!(export.verification.as_ref().unwrap().valid);

        let parsed = parse_export(&export.render(ExportFormat::Jsonl).unwrap()).unwrap();
        assert!(verify_events(&parsed.events).valid);

        assert!(log.export(&a, false).unwrap().verification.is_none());
    }

    #[test]
    fn test_file_log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let a = agent("agent_1");
        let head = {
            let log = AuditLog::open(dir.path(), Arc::new(clock())).unwrap();
            log.append(&a, write("k1")).unwrap();
            log.append(&a, write("k2")).unwrap().hash
        };

        let log = AuditLog::open(dir.path(), Arc::new(clock())).unwrap();
        assert_eq!(log.head(&a).unwrap(), head);
        let third = log.append(&a, write("k3")).unwrap();
        assert_eq!(third.sequence, 2);
        assert_eq!(third.previous_hash, head);
        assert_eq!(log.verify(&a).unwrap().events_checked, 3);
    }

    #[test]
    fn test_file_tampering_detected_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let a = agent("agent_1");
        {
            let log = AuditLog::open(dir.path(), Arc::new(clock())).unwrap();
            log.append(&a, write("user:name")).unwrap();
            log.append(&a, write("user:email")).unwrap();
        }

        let path = dir.path().join("agent_1.jsonl");
        let text = std::fs::read_to_string(&path).unwrap();
        let tampered = text.replacen("user:name", "user:nick", 1);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(tampered.as_bytes())
            .unwrap();

        let log = AuditLog::open(dir.path(), Arc::new(clock())).unwrap();
        let result = log.verify(&a).unwrap();
        assert!(!result.valid);
        assert_eq!(result.events_checked, 1);
        assert!(matches!(
            result.into_result(),
            Err(AuditError::ChainIntegrity { .. })
        ));
    }

    #[test]
    fn test_torn_line_does_not_block_other_agents() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (agent("agent_1"), agent("agent_2"));
        let head_a = {
            let log = AuditLog::open(dir.path(), Arc::new(clock())).unwrap();
            log.append(&b, write("k")).unwrap();
            log.append(&a, write("k1")).unwrap();
            log.append(&a, write("k2")).unwrap().hash
        };

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("agent_1.jsonl"))
            .unwrap();
        file.write_all(br#"{"id":"1234"#).unwrap();
        drop(file);

        let log = AuditLog::open(dir.path(), Arc::new(clock())).unwrap();
        let verification = log.verify(&b).unwrap();
        assert!(verification.valid);
        assert_eq!(verification.events_checked, 1);

        // The torn write is dropped; the committed chain continues.
        assert_eq!(log.head(&a).unwrap(), head_a);
        let next = log.append(&a, write("k3")).unwrap();
        assert_eq!(next.sequence, 2);
        assert_eq!(log.verify(&a).unwrap().events_checked, 3);
    }

    #[test]
    fn test_unreadable_agent_is_skipped_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (agent("agent_1"), agent("agent_2"));
        {
            let log = AuditLog::open(dir.path(), Arc::new(clock())).unwrap();
            log.append(&a, write("k1")).unwrap();
            log.append(&a, write("k2")).unwrap();
            log.append(&b, write("k")).unwrap();
        }

        // Corrupt a committed line in the middle of agent_1's file.
        let path = dir.path().join("agent_1.jsonl");
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, format!("{{garbage\n{text}")).unwrap();

        let log = AuditLog::open(dir.path(), Arc::new(clock())).unwrap();
        assert!(log.verify(&b).unwrap().valid);
        assert!(matches!(
            log.verify(&a),
            Err(AuditError::Serialization(_))
        ));
        assert!(log.append(&a, write("k3")).is_err());

        let all = log.verify_all().unwrap();
        assert_eq!(all.len(), 2);
        assert!(matches!(all[0].issue, Some(ChainIssue::Unreadable { .. })));
        assert!(all[1].valid);
    }

    #[derive(Debug)]
    struct RejectingStorage;

    impl AuditStorage for RejectingStorage {
        fn append(&self, _event: &AuditEvent) -> AuditResult<()> {
            Err(AuditError::Storage("disk full".into()))
        }

        fn load(&self, _agent_id: &AgentId) -> AuditResult<Vec<AuditEvent>> {
            Ok(Vec::new())
        }

        fn agents(&self) -> AuditResult<Vec<AgentId>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_failed_append_leaves_head_unchanged() {
        let log = AuditLog::with_storage(Arc::new(RejectingStorage), Arc::new(clock()));
        let a = agent("agent_1");
        assert!(log.append(&a, write("k")).is_err());
        assert!(log.head(&a).unwrap().is_genesis());
        assert_eq!(log.event_count(&a).unwrap(), 0);
    }
}
