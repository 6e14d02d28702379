//! Configuration types for Anchor.
//!
//! These types have no dependency on the other Anchor crates. Policy
//! sections mirror `anchor_policy::PolicyConfig` and are converted at the
//! runtime boundary. Every struct implements [`Default`] so that a bare
//! `[section]` header produces a working configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Governed store settings.
    pub store: StoreSection,
    /// Retention reaper settings.
    pub retention: RetentionSection,
    /// Audit storage backend.
    pub audit: AuditSection,
    /// Logging level, format and directives.
    pub logging: LoggingSection,
    /// Per-agent settings keyed by agent id.
    pub agents: BTreeMap<String, AgentSection>,
}

// ---------------------------------------------------------------------------
// StoreSection
// ---------------------------------------------------------------------------

/// Governed store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// How long an operation waits for an agent's section, in milliseconds.
    pub lock_timeout_ms: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5000,
        }
    }
}

// ---------------------------------------------------------------------------
// RetentionSection
// ---------------------------------------------------------------------------

/// Background retention reaper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSection {
    /// Whether the reaper runs.
    pub reaper_enabled: bool,
    /// Seconds between sweeps.
    pub reaper_interval_secs: u64,
    /// Seconds a tombstone is kept before it is purged.
    pub tombstone_grace_secs: u64,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            reaper_enabled: true,
            reaper_interval_secs: 60,
            tombstone_grace_secs: 86_400,
        }
    }
}

// ---------------------------------------------------------------------------
// AuditSection
// ---------------------------------------------------------------------------

/// Audit storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSection {
    /// `"memory"` or `"file"`.
    pub backend: String,
    /// Directory holding one `<agent>.jsonl` file per agent. Required for
    /// the file backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            backend: "memory".to_owned(),
            path: None,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"` or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["anchor_runtime=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// AgentSection
// ---------------------------------------------------------------------------

/// Settings for one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Governance policy installed for the agent at startup.
    pub policies: PolicySection,
}

/// A named custom blocking pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPatternSection {
    /// Pattern name.
    pub name: String,
    /// Regular expression.
    pub regex: String,
}

/// Governance policy as written in the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// Block emails, SSNs and phone numbers.
    pub block_pii: bool,
    /// Block API keys, tokens and password-like values.
    pub block_secrets: bool,
    /// Additional blocking patterns, in evaluation order.
    pub custom_blocked_patterns: Vec<CustomPatternSection>,
    /// Default retention in days.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
    /// Retention in days per key prefix.
    pub retention_by_prefix: BTreeMap<String, u32>,
    /// Allowed key prefixes. Empty allows every key.
    pub allowed_key_prefixes: Vec<String>,
    /// Denied key prefixes.
    pub denied_key_prefixes: Vec<String>,
    /// Maximum value size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value_size_bytes: Option<u64>,
    /// Maximum number of live keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_keys_per_agent: Option<u64>,
}
