//! Write evaluation.
//!
//! # Evaluation Order
//!
//! 1. Does the key start with a denied prefix? -> `prefix_denied`
//! 2. Is there an allow-list that the key misses? -> `prefix_not_allowed`
//! 3. Is the value larger than `max_value_size_bytes`? -> `value_too_large`
//! 4. Does the value contain PII (when `block_pii`)? -> `pii_detected`
//! 5. Does the value contain a secret (when `block_secrets`)? -> `secret_detected`
//! 6. Does a custom pattern match, in configured order? -> `custom_pattern_matched:<name>`
//! 7. Would a new key exceed `max_keys_per_agent`? -> `key_limit_exceeded`
//! 8. Otherwise -> allowed, with `expires_at` from the retention rules
//!
//! The first failing check decides the outcome.

use std::borrow::Cow;

use anchor_core::{AgentId, Timestamp};
use serde_json::{Map, Value};
use tracing::debug;

use crate::compiled::CompiledPolicy;
use crate::config::PolicyConfig;
use crate::decision::{Decision, ReasonCode};
use crate::matcher::{PatternMatcher, RuleSet};

/// Everything the engine needs to judge one write.
///
/// The caller reads `key_exists` and `live_key_count` from the store inside
/// the same critical section that later applies the write.
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    /// Agent performing the write.
    pub agent_id: &'a AgentId,
    /// Key being written.
    pub key: &'a str,
    /// Value being written.
    pub value: &'a Value,
    /// Caller-supplied metadata.
    pub metadata: &'a Map<String, Value>,
    /// Whether the key is currently live for this agent.
    pub key_exists: bool,
    /// Number of live keys the agent currently holds.
    pub live_key_count: u64,
    /// The instant the write is evaluated at.
    pub now: Timestamp,
}

/// Stateless evaluator of [`WriteRequest`]s.
///
/// # Example
///
/// ```
/// use anchor_core::{AgentId, Timestamp};
/// use anchor_policy::{CompiledPolicy, PolicyConfig, PolicyEngine, ReasonCode, WriteRequest};
///
/// let policy = CompiledPolicy::compile(PolicyConfig {
///     block_pii: true,
///     ..PolicyConfig::default()
/// })
/// .unwrap();
///
/// let agent = AgentId::new("agent_1").unwrap();
/// let value = serde_json::json!("reach me at jane@example.com");
/// let metadata = serde_json::Map::new();
/// let decision = PolicyEngine::evaluate(
///     &WriteRequest {
///         agent_id: &agent,
///         key: "user:contact",
///         value: &value,
///         metadata: &metadata,
///         key_exists: false,
///         live_key_count: 0,
///         now: Timestamp::now(),
///     },
///     &policy,
/// );
///
/// assert_eq!(decision.reason, Some(ReasonCode::PiiDetected));
/// assert_eq!(decision.matched_rule.as_deref(), Some("email"));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    /// Evaluate a write against a policy.
    #[must_use]
    pub fn evaluate(request: &WriteRequest<'_>, policy: &CompiledPolicy) -> Decision {
        let decision = Self::check(request, policy).unwrap_or_else(|| {
            Decision::allow(expiry_for(request.key, policy.config(), request.now))
        });

        if let Some(reason) = &decision.reason {
            debug!(
                agent_id = %request.agent_id,
                key = request.key,
                %reason,
                matched_rule = decision.matched_rule.as_deref(),
                "Write denied by policy"
            );
        }
        decision
    }

    fn check(request: &WriteRequest<'_>, policy: &CompiledPolicy) -> Option<Decision> {
        let config = policy.config();
        let key = request.key;

        if let Some(prefix) = config
            .denied_key_prefixes
            .iter()
            .find(|p| key.starts_with(p.as_str()))
        {
            return Some(Decision::deny(ReasonCode::PrefixDenied, Some(prefix.clone())));
        }

        if !config.allowed_key_prefixes.is_empty()
            && !config
                .allowed_key_prefixes
                .iter()
                .any(|p| key.starts_with(p.as_str()))
        {
            return Some(Decision::deny(ReasonCode::PrefixNotAllowed, None));
        }

        let text = value_text(request.value);

        if let Some(limit) = config.max_value_size_bytes {
            let size = u64::try_from(text.len()).unwrap_or(u64::MAX);
            if size > limit {
                return Some(Decision::deny(ReasonCode::ValueTooLarge, None));
            }
        }

        if config.block_pii
            && let Some(rule) = first_match(&text, RuleSet::pii())
        {
            return Some(Decision::deny(ReasonCode::PiiDetected, Some(rule)));
        }

        if config.block_secrets
            && let Some(rule) = first_match(&text, RuleSet::secrets())
        {
            return Some(Decision::deny(ReasonCode::SecretDetected, Some(rule)));
        }

        if let Some(rule) = PatternMatcher::first_rule_match(&text, policy.custom_rules()) {
            let name = rule.name().to_owned();
            return Some(Decision::deny(
                ReasonCode::CustomPatternMatched(name.clone()),
                Some(name),
            ));
        }

        if let Some(limit) = config.max_keys_per_agent
            && !request.key_exists
            && request.live_key_count >= limit
        {
            return Some(Decision::deny(ReasonCode::KeyLimitExceeded, None));
        }

        None
    }
}

/// Text inspected by the content rules and measured by the size limit.
///
/// String values are used as-is; anything else is rendered as compact JSON.
#[must_use]
pub fn value_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}

/// Size of a value as counted against `max_value_size_bytes`.
#[must_use]
pub fn value_size(value: &Value) -> usize {
    value_text(value).len()
}

/// Expiry for a key written at `now`.
///
/// The longest matching `retention_by_prefix` entry wins; otherwise
/// `retention_days` applies; otherwise the entry never expires.
#[must_use]
pub fn expiry_for(key: &str, config: &PolicyConfig, now: Timestamp) -> Option<Timestamp> {
    config
        .retention_by_prefix
        .iter()
        .filter(|(prefix, _)| key.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, days)| *days)
        .or(config.retention_days)
        .map(|days| now.plus_days(days))
}

fn first_match(text: &str, rules: &RuleSet) -> Option<String> {
    PatternMatcher::find_all(text, rules)
        .into_iter()
        .next()
        .map(|m| m.rule_name)
}
