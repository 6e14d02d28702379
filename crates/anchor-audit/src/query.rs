//! Audit query filters.

use anchor_core::Timestamp;
use serde::{Deserialize, Serialize};

use crate::event::{AuditEvent, AuditOperation, AuditOutcome};

/// Filter for [`AuditLog::query`](crate::AuditLog::query).
///
/// All set conditions must hold. Results are returned most recent first and
/// truncated to `limit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditQuery {
    /// Only these operations. Empty means any.
    pub operations: Vec<AuditOperation>,
    /// Only this outcome.
    pub result: Option<AuditOutcome>,
    /// Only resources starting with this prefix.
    pub resource_prefix: Option<String>,
    /// Only events at or after this time.
    pub since: Option<Timestamp>,
    /// Only events strictly before this time.
    pub until: Option<Timestamp>,
    /// Maximum number of events returned.
    pub limit: Option<usize>,
}

impl AuditQuery {
    /// A query matching every event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to the given operations.
    #[must_use]
    pub fn operations(mut self, operations: impl IntoIterator<Item = AuditOperation>) -> Self {
        self.operations = operations.into_iter().collect();
        self
    }

    /// Restrict to one outcome.
    #[must_use]
    pub fn result(mut self, result: AuditOutcome) -> Self {
        self.result = Some(result);
        self
    }

    /// Restrict to resources under a prefix.
    #[must_use]
    pub fn resource_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.resource_prefix = Some(prefix.into());
        self
    }

    /// Restrict to `[since, until)`.
    #[must_use]
    pub fn between(mut self, since: Timestamp, until: Timestamp) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    /// Cap the number of results.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `event` passes every condition.
    #[must_use]
    pub fn matches(&self, event: &AuditEvent) -> bool {
        (self.operations.is_empty() || self.operations.contains(&event.operation))
            && self.result.is_none_or(|r| r == event.result)
            && self
                .resource_prefix
                .as_deref()
                .is_none_or(|p| event.resource.starts_with(p))
            && self.since.is_none_or(|t| event.timestamp >= t)
            && self.until.is_none_or(|t| event.timestamp < t)
    }

    /// Apply the filter to a chain given oldest first.
    #[must_use]
    pub fn apply(&self, events: &[AuditEvent]) -> Vec<AuditEvent> {
        events
            .iter()
            .rev()
            .filter(|e| self.matches(e))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_core::AgentId;
    use anchor_crypto::ContentHash;
    use chrono::{TimeZone, Utc};

    use crate::event::AuditRecord;

    fn at(hour: u32) -> Timestamp {
        Timestamp(Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap())
    }

    fn events() -> Vec<AuditEvent> {
        let agent = AgentId::new("agent_1").unwrap();
        [
            (AuditOperation::DataWrite, "user:a", AuditOutcome::Allowed),
            (AuditOperation::DataWrite, "user:b", AuditOutcome::Denied),
            (AuditOperation::DataDelete, "temp:x", AuditOutcome::Success),
            (AuditOperation::DataWrite, "temp:y", AuditOutcome::Allowed),
        ]
        .into_iter()
        .zip(0_u64..)
        .map(|((op, resource, result), seq)| {
            AuditEvent::seal(
                agent.clone(),
                seq,
                AuditRecord::new(op, resource, result),
                at(u32::try_from(seq).unwrap()),
                ContentHash::genesis(),
            )
            .unwrap()
        })
        .collect()
    }

    fn resources(found: &[AuditEvent]) -> Vec<&str> {
        found.iter().map(|e| e.resource.as_str()).collect()
    }

    #[test]
    fn test_most_recent_first() {
        let found = AuditQuery::new().apply(&events());
        assert_eq!(resources(&found), ["temp:y", "temp:x", "user:b", "user:a"]);
    }

    #[test]
    fn test_filters_combine() {
        let found = AuditQuery::new()
            .operations([AuditOperation::DataWrite])
            .result(AuditOutcome::Allowed)
            .apply(&events());
        assert_eq!(resources(&found), ["temp:y", "user:a"]);

        let found = AuditQuery::new().resource_prefix("temp:").apply(&events());
        assert_eq!(resources(&found), ["temp:y", "temp:x"]);
    }

    #[test]
    fn test_time_range_is_half_open() {
        let found = AuditQuery::new().between(at(1), at(3)).apply(&events());
        assert_eq!(resources(&found), ["temp:x", "user:b"]);
    }

    #[test]
    fn test_limit() {
        let found = AuditQuery::new().limit(1).apply(&events());
        assert_eq!(resources(&found), ["temp:y"]);
    }
}
