//! Policy command - dry-run evaluation of a write against a policy file.

use std::path::Path;

use anchor_config::PolicySection;
use anchor_core::{AgentId, Timestamp};
use anchor_policy::{CompiledPolicy, Decision, PolicyConfig, PolicyEngine, WriteRequest};
use anchor_runtime::config_bridge::to_policy_config;
use anyhow::Context;
use serde_json::{Map, Value};

use crate::theme::Theme;

/// Store state to evaluate against.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DryRunState {
    /// Treat the key as already live.
    pub(crate) key_exists: bool,
    /// Live keys the agent is assumed to hold.
    pub(crate) live_keys: u64,
}

/// Read a policy file.
///
/// The file holds the fields of one `[agents.<id>.policies]` table at top
/// level, e.g. `block_pii = true`.
pub(crate) fn load_policy(path: &Path) -> anyhow::Result<PolicyConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let section: PolicySection =
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(to_policy_config(&section))
}

/// Interpret a command-line value: JSON if it parses, a plain string
/// otherwise.
pub(crate) fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

/// Evaluate one write without touching any store.
pub(crate) fn evaluate(
    policy: PolicyConfig,
    agent_id: &AgentId,
    key: &str,
    value: &Value,
    state: DryRunState,
) -> anyhow::Result<Decision> {
    let compiled = CompiledPolicy::compile(policy).context("policy failed validation")?;
    let metadata = Map::new();
    Ok(PolicyEngine::evaluate(
        &WriteRequest {
            agent_id,
            key,
            value,
            metadata: &metadata,
            key_exists: state.key_exists,
            live_key_count: state.live_keys,
            now: Timestamp::now(),
        },
        &compiled,
    ))
}

/// Run `anchor policy check`.
pub(crate) fn check_policy(
    policy_path: &Path,
    agent: &str,
    key: &str,
    raw_value: &str,
    state: DryRunState,
    json: bool,
) -> anyhow::Result<()> {
    let policy = load_policy(policy_path)?;
    let agent_id = AgentId::new(agent)?;
    let value = parse_value(raw_value);
    let decision = evaluate(policy, &agent_id, key, &value, state)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
        return Ok(());
    }

    println!("\n{}", Theme::header("Policy Dry Run"));
    println!("{}", Theme::kv("Agent", agent_id.as_str()));
    println!("{}", Theme::kv("Key", key));
    println!("{}", Theme::separator());

    if decision.allowed {
        println!("{}", Theme::success("Write would be allowed"));
        if let Some(expires_at) = decision.expires_at {
            println!("  {}", Theme::kv("Expires", &expires_at.to_string()));
        }
    } else {
        let reason = decision
            .reason
            .as_ref()
            .map_or_else(|| "unknown".to_owned(), ToString::to_string);
        println!("{}", Theme::error(&format!("Write would be denied: {reason}")));
        if let Some(rule) = &decision.matched_rule {
            println!("  {}", Theme::kv("Matched", rule));
        }
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_policy::ReasonCode;
    use serde_json::json;

    fn agent() -> AgentId {
        AgentId::new("cli").unwrap()
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_value("hello world"), json!("hello world"));
    }

    #[test]
    fn test_load_and_evaluate_policy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(
            &path,
            "block_pii = true\ndenied_key_prefixes = [\"internal:\"]\n",
        )
        .unwrap();

        let policy = load_policy(&path).unwrap();
        let denied = evaluate(
            policy.clone(),
            &agent(),
            "user:email",
            &json!("a@b.com"),
            DryRunState::default(),
        )
        .unwrap();
        assert_eq!(denied.reason, Some(ReasonCode::PiiDetected));

        let prefix = evaluate(
            policy,
            &agent(),
            "internal:x",
            &json!("ok"),
            DryRunState::default(),
        )
        .unwrap();
        assert_eq!(prefix.reason, Some(ReasonCode::PrefixDenied));
    }

    #[test]
    fn test_key_limit_uses_dry_run_state() {
        let policy = PolicyConfig {
            max_keys_per_agent: Some(2),
            ..PolicyConfig::default()
        };
        let full = DryRunState {
            key_exists: false,
            live_keys: 2,
        };
        let decision = evaluate(policy.clone(), &agent(), "k", &json!(1), full).unwrap();
        assert!(!decision.allowed);

        let overwrite = DryRunState {
            key_exists: true,
            live_keys: 2,
        };
        assert!(evaluate(policy, &agent(), "k", &json!(1), overwrite).unwrap().allowed);
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(
            &path,
            "[[custom_blocked_patterns]]\nname = \"bad\"\nregex = \"(\"\n",
        )
        .unwrap();
        let policy = load_policy(&path).unwrap();
        assert!(evaluate(policy, &agent(), "k", &json!(1), DryRunState::default()).is_err());
    }
}
