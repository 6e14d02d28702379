//! Test fixtures for common types.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value, json};

use anchor_core::AgentId;
use anchor_policy::{CustomPattern, PolicyConfig};

/// Create the default test agent ID (`agent_test`).
///
/// # Panics
///
/// Never panics; the id is statically valid.
#[must_use]
pub fn test_agent_id() -> AgentId {
    test_agent_id_named("agent_test")
}

/// Create a test agent ID with a specific name.
///
/// # Panics
///
/// Panics if `name` is not a valid agent id.
#[must_use]
pub fn test_agent_id_named(name: &str) -> AgentId {
    AgentId::new(name).expect("invalid test agent id")
}

/// Fixed start time used by [`GovernanceHarness`](crate::GovernanceHarness):
/// 2024-01-01T00:00:00Z.
///
/// # Panics
///
/// Never panics; the date is statically valid.
#[must_use]
pub fn test_start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid fixed date")
}

/// A policy that blocks PII.
#[must_use]
pub fn pii_policy() -> PolicyConfig {
    PolicyConfig {
        block_pii: true,
        ..PolicyConfig::default()
    }
}

/// A policy that blocks secrets.
#[must_use]
pub fn secrets_policy() -> PolicyConfig {
    PolicyConfig {
        block_secrets: true,
        ..PolicyConfig::default()
    }
}

/// A policy exercising every rule kind.
///
/// Blocks PII, secrets and `PROJECT-<digits>` codes; denies `internal:`;
/// allows only `user:`, `session:` and `notes:`; caps values at 1 KiB and
/// the agent at 100 keys; keeps `session:` keys for 1 day and everything
/// else for 30.
#[must_use]
pub fn strict_policy() -> PolicyConfig {
    PolicyConfig {
        block_pii: true,
        block_secrets: true,
        custom_blocked_patterns: vec![CustomPattern::new("project_code", r"PROJECT-\d+")],
        retention_days: Some(30),
        retention_by_prefix: [("session:".to_owned(), 1)].into_iter().collect(),
        allowed_key_prefixes: ["user:", "session:", "notes:"]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        denied_key_prefixes: ["internal:".to_owned()].into_iter().collect(),
        max_value_size_bytes: Some(1024),
        max_keys_per_agent: Some(100),
    }
}

/// A policy with a per-prefix retention rule.
#[must_use]
pub fn retention_policy(prefix: &str, days: u32) -> PolicyConfig {
    PolicyConfig {
        retention_by_prefix: [(prefix.to_owned(), days)].into_iter().collect(),
        ..PolicyConfig::default()
    }
}

/// Metadata map from key/value pairs.
#[must_use]
pub fn test_metadata<'a>(pairs: impl IntoIterator<Item = (&'a str, Value)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect()
}

/// A structured value that passes every built-in content rule.
#[must_use]
pub fn test_profile_value() -> Value {
    json!({
        "name": "Ada",
        "preferences": { "theme": "dark", "language": "en" },
        "tags": ["beta", "early-adopter"],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_ids_are_valid() {
        assert_eq!(test_agent_id().as_str(), "agent_test");
        assert_eq!(test_agent_id_named("other").as_str(), "other");
    }

    #[test]
    fn test_strict_policy_is_not_permissive() {
        assert!(!strict_policy().is_permissive());
        assert!(PolicyConfig::default().is_permissive());
    }

    #[test]
    fn test_metadata_builder() {
        let meta = test_metadata([("source", json!("import")), ("batch", json!(3))]);
        assert_eq!(meta["source"], "import");
        assert_eq!(meta.len(), 2);
    }
}
