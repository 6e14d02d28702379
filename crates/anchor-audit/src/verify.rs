//! Chain verification.
//!
//! Verification works on serialized events alone: it needs no log, storage
//! or in-memory state, so an exported chain can be checked offline.

use std::fmt;

use anchor_core::AgentId;
use anchor_crypto::ContentHash;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{AuditError, AuditResult};
use crate::event::{AuditEvent, AuditEventId};

/// Result of verifying a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerification {
    /// Agent the chain belongs to, when it has any events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Whether every event checked out.
    pub valid: bool,
    /// Events examined, including the first invalid one.
    pub events_checked: u64,
    /// The first event that failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_invalid: Option<AuditEventId>,
    /// Why it failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<ChainIssue>,
}

impl ChainVerification {
    /// Turn an invalid result into [`AuditError::ChainIntegrity`].
    ///
    /// # Errors
    ///
    /// Returns the integrity error if the chain is invalid.
    pub fn into_result(self) -> AuditResult<Self> {
        if self.valid {
            return Ok(self);
        }
        Err(AuditError::ChainIntegrity {
            agent_id: self
                .agent_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            event_id: self
                .first_invalid
                .map(|id| id.to_string())
                .unwrap_or_default(),
            reason: self
                .issue
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
        })
    }
}

/// An issue found during chain verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainIssue {
    /// Event belongs to a different agent than the chain.
    AgentMismatch {
        /// Agent of the chain.
        expected: AgentId,
        /// Agent on the event.
        found: AgentId,
    },
    /// Event is not at the position it claims (reordered, dropped or
    /// duplicated events).
    SequenceMismatch {
        /// Position in the chain.
        expected: u64,
        /// Sequence stored on the event.
        found: u64,
    },
    /// `previous_hash` does not match the preceding event's hash.
    BrokenLink {
        /// Hash of the preceding event (or genesis).
        expected_previous: ContentHash,
        /// `previous_hash` stored on the event.
        actual_previous: ContentHash,
    },
    /// Recomputing the hash from the event's fields gives a different value.
    HashMismatch {
        /// Hash recomputed from the fields.
        computed: ContentHash,
        /// Hash stored on the event.
        stored: ContentHash,
    },
    /// Event could not be serialized for hashing.
    Unhashable {
        /// Serialization error.
        message: String,
    },
    /// Stored chain could not be parsed.
    Unreadable {
        /// Parse error with file and line.
        message: String,
    },
}

impl fmt::Display for ChainIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AgentMismatch { expected, found } => {
                write!(f, "event belongs to agent {found}, chain belongs to {expected}")
            },
            Self::SequenceMismatch { expected, found } => {
                write!(f, "sequence {found} at position {expected}")
            },
            Self::BrokenLink {
                expected_previous,
                actual_previous,
            } => write!(
                f,
                "previous_hash {} does not match {}",
                actual_previous.short(),
                expected_previous.short()
            ),
            Self::HashMismatch { computed, stored } => write!(
                f,
                "stored hash {} does not match computed {}",
                stored.short(),
                computed.short()
            ),
            Self::Unhashable { message } => write!(f, "event cannot be hashed: {message}"),
            Self::Unreadable { message } => write!(f, "stored chain cannot be read: {message}"),
        }
    }
}

/// Verify a chain from its events, oldest first.
///
/// Checks, for every event in order: agent, sequence, link to the previous
/// hash (genesis for the first), and the recomputed hash. Stops at the first
/// failure.
#[must_use]
pub fn verify_events(events: &[AuditEvent]) -> ChainVerification {
    let agent_id = events.first().map(|e| e.agent_id.clone());
    let mut expected_previous = ContentHash::genesis();
    let mut events_checked: u64 = 0;

    for (expected_sequence, event) in (0_u64..).zip(events) {
        events_checked = events_checked.saturating_add(1);

        if let Some(issue) = check_event(event, agent_id.as_ref(), expected_sequence, expected_previous)
        {
            error!(
                agent_id = %event.agent_id,
                event_id = %event.id,
                sequence = event.sequence,
                %issue,
                "Audit chain verification failed"
            );
            return ChainVerification {
                agent_id,
                valid: false,
                events_checked,
                first_invalid: Some(event.id),
                issue: Some(issue),
            };
        }
        expected_previous = event.hash;
    }

    ChainVerification {
        agent_id,
        valid: true,
        events_checked,
        first_invalid: None,
        issue: None,
    }
}

fn check_event(
    event: &AuditEvent,
    agent_id: Option<&AgentId>,
    expected_sequence: u64,
    expected_previous: ContentHash,
) -> Option<ChainIssue> {
    if let Some(expected) = agent_id
        && *expected != event.agent_id
    {
        return Some(ChainIssue::AgentMismatch {
            expected: expected.clone(),
            found: event.agent_id.clone(),
        });
    }
    if event.sequence != expected_sequence {
        return Some(ChainIssue::SequenceMismatch {
            expected: expected_sequence,
            found: event.sequence,
        });
    }
    if event.previous_hash != expected_previous {
        return Some(ChainIssue::BrokenLink {
            expected_previous,
            actual_previous: event.previous_hash,
        });
    }
    match event.compute_hash() {
        Ok(computed) if computed == event.hash => None,
        Ok(computed) => Some(ChainIssue::HashMismatch {
            computed,
            stored: event.hash,
        }),
        Err(e) => Some(ChainIssue::Unhashable {
            message: e.to_string(),
        }),
    }
}
