//! Audit event types.
//!
//! Events are chain-linked: each stores the hash of the previous event of the
//! same agent, and its own hash covers that value plus its canonical JSON.
//! Changing any field of any past event breaks every later link.

use std::fmt;
use std::str::FromStr;

use anchor_core::{AgentId, Timestamp};
use anchor_crypto::ContentHash;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{AuditError, AuditResult};

/// Unique identifier of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditEventId(pub Uuid);

impl AuditEventId {
    /// Create a new random event id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AuditEventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuditEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AuditEventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The governed operation an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditOperation {
    /// A write attempt, allowed or denied.
    #[serde(rename = "data.write")]
    DataWrite,
    /// A single-key delete.
    #[serde(rename = "data.delete")]
    DataDelete,
    /// A prefix delete.
    #[serde(rename = "data.delete_prefix")]
    DataDeletePrefix,
    /// A checkpoint restore.
    #[serde(rename = "checkpoint.restore")]
    CheckpointRestore,
    /// A reaper pass that expired or purged entries.
    #[serde(rename = "retention.purge")]
    RetentionPurge,
}

impl AuditOperation {
    /// Every operation, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::DataWrite,
        Self::DataDelete,
        Self::DataDeletePrefix,
        Self::CheckpointRestore,
        Self::RetentionPurge,
    ];

    /// Dotted wire name, e.g. `data.write`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataWrite => "data.write",
            Self::DataDelete => "data.delete",
            Self::DataDeletePrefix => "data.delete_prefix",
            Self::CheckpointRestore => "checkpoint.restore",
            Self::RetentionPurge => "retention.purge",
        }
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditOperation {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| AuditError::Serialization(format!("unknown audit operation: {s}")))
    }
}

/// Outcome of the recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// A write passed policy and was committed.
    Allowed,
    /// A write was denied by policy.
    Denied,
    /// A non-write operation completed.
    Success,
    /// A non-write operation failed.
    Failure,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allowed => write!(f, "allowed"),
            Self::Denied => write!(f, "denied"),
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

impl FromStr for AuditOutcome {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allowed" => Ok(Self::Allowed),
            "denied" => Ok(Self::Denied),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(AuditError::Serialization(format!(
                "unknown audit outcome: {other}"
            ))),
        }
    }
}

/// An operation about to be recorded.
///
/// The log assigns id, sequence, previous hash and (unless set with
/// [`AuditRecord::at`]) the timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub(crate) operation: AuditOperation,
    pub(crate) resource: String,
    pub(crate) result: AuditOutcome,
    pub(crate) metadata: Map<String, Value>,
    pub(crate) timestamp: Option<Timestamp>,
}

impl AuditRecord {
    /// Start a record.
    #[must_use]
    pub fn new(operation: AuditOperation, resource: impl Into<String>, result: AuditOutcome) -> Self {
        Self {
            operation,
            resource: resource.into(),
            result,
            metadata: Map::new(),
            timestamp: None,
        }
    }

    /// Replace the metadata object.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add one metadata field.
    #[must_use]
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Stamp the record with the time the operation was decided.
    #[must_use]
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A single entry in an agent's audit chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique id.
    pub id: AuditEventId,
    /// Owning agent.
    pub agent_id: AgentId,
    /// 0-based position in the agent's chain.
    pub sequence: u64,
    /// What happened.
    pub operation: AuditOperation,
    /// Key, prefix or checkpoint the operation targeted.
    pub resource: String,
    /// How it ended.
    pub result: AuditOutcome,
    /// Operation details (decision reason, version, counts, ...).
    pub metadata: Map<String, Value>,
    /// When it happened.
    pub timestamp: Timestamp,
    /// Hash of this event.
    pub hash: ContentHash,
    /// Hash of the previous event, or genesis for the first.
    pub previous_hash: ContentHash,
}

/// Fields covered by the event hash, in their fixed order.
///
/// `serde_json::Map` keeps keys sorted, so nested metadata is canonical too.
#[derive(Serialize)]
struct CanonicalEvent<'a> {
    id: &'a AuditEventId,
    agent_id: &'a AgentId,
    sequence: u64,
    operation: AuditOperation,
    resource: &'a str,
    result: AuditOutcome,
    metadata: &'a Map<String, Value>,
    timestamp: &'a Timestamp,
    previous_hash: &'a ContentHash,
}

impl AuditEvent {
    /// Build and hash the event that follows `previous_hash` at `sequence`.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized.
    pub fn seal(
        agent_id: AgentId,
        sequence: u64,
        record: AuditRecord,
        timestamp: Timestamp,
        previous_hash: ContentHash,
    ) -> AuditResult<Self> {
        let mut event = Self {
            id: AuditEventId::new(),
            agent_id,
            sequence,
            operation: record.operation,
            resource: record.resource,
            result: record.result,
            metadata: record.metadata,
            timestamp: record.timestamp.unwrap_or(timestamp),
            hash: ContentHash::genesis(),
            previous_hash,
        };
        event.hash = event.compute_hash()?;
        Ok(event)
    }

    /// Canonical bytes covered by the hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized.
    pub fn canonical_bytes(&self) -> AuditResult<Vec<u8>> {
        serde_json::to_vec(&CanonicalEvent {
            id: &self.id,
            agent_id: &self.agent_id,
            sequence: self.sequence,
            operation: self.operation,
            resource: &self.resource,
            result: self.result,
            metadata: &self.metadata,
            timestamp: &self.timestamp,
            previous_hash: &self.previous_hash,
        })
        .map_err(|e| AuditError::Serialization(e.to_string()))
    }

    /// Recompute this event's hash from its fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized.
    pub fn compute_hash(&self) -> AuditResult<ContentHash> {
        Ok(ContentHash::link(
            &self.previous_hash,
            &self.canonical_bytes()?,
        ))
    }

    /// Whether this event directly follows `previous` in a chain.
    #[must_use]
    pub fn follows(&self, previous: &AuditEvent) -> bool {
        self.previous_hash == previous.hash && Some(self.sequence) == previous.sequence.checked_add(1)
    }

    /// A metadata field as a string, if present.
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}
