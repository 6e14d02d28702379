//! Policy configuration as supplied by the config source.
//!
//! This is the `policies` section of an agent's configuration. Everything
//! else in that configuration is opaque to the governance core.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A user-supplied content pattern that blocks writes when it matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPattern {
    /// Name reported in `custom_pattern_matched:<name>`.
    pub name: String,
    /// Regular expression, compiled when the policy is installed.
    pub regex: String,
}

impl CustomPattern {
    /// Create a custom pattern.
    #[must_use]
    pub fn new(name: impl Into<String>, regex: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            regex: regex.into(),
        }
    }
}

/// Governance rules enforced on every write for one agent.
///
/// The default is fully permissive: no content inspection, no prefix rules,
/// no limits and no retention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Block emails, SSNs and phone numbers.
    pub block_pii: bool,
    /// Block API keys, tokens, private keys and password-like values.
    pub block_secrets: bool,
    /// Additional blocking patterns, evaluated in order.
    pub custom_blocked_patterns: Vec<CustomPattern>,
    /// Default retention for new entries, in days.
    pub retention_days: Option<u32>,
    /// Retention per key prefix, in days. Longest matching prefix wins.
    pub retention_by_prefix: BTreeMap<String, u32>,
    /// If non-empty, keys must start with one of these prefixes.
    pub allowed_key_prefixes: BTreeSet<String>,
    /// Keys starting with any of these prefixes are rejected. Checked first.
    pub denied_key_prefixes: BTreeSet<String>,
    /// Maximum value size in bytes.
    pub max_value_size_bytes: Option<u64>,
    /// Maximum number of live keys per agent.
    pub max_keys_per_agent: Option<u64>,
}

impl PolicyConfig {
    /// A policy with no rules.
    #[must_use]
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Whether any rule in this policy can deny a write.
    #[must_use]
    pub fn is_permissive(&self) -> bool {
        !self.block_pii
            && !self.block_secrets
            && self.custom_blocked_patterns.is_empty()
            && self.allowed_key_prefixes.is_empty()
            && self.denied_key_prefixes.is_empty()
            && self.max_value_size_bytes.is_none()
            && self.max_keys_per_agent.is_none()
    }
}
