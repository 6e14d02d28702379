//! Bridge from `anchor_config::Config` to runtime and policy types.
//!
//! The config crate has no dependencies on other internal crates. This module
//! translates its plain sections into the store, reaper, logging, audit and
//! policy types, so the conversion happens once, in one place.

use std::sync::Arc;
use std::time::Duration;

use anchor_audit::AuditLog;
use anchor_config::validate::validate_audit;
use anchor_config::{Config, PolicySection};
use anchor_core::{AgentId, Clock};
use anchor_policy::{CustomPattern, PolicyConfig, PolicyRegistry};
use anchor_telemetry::{LogConfig, LogFormat};
use tracing::info;

use crate::error::RuntimeResult;
use crate::reaper::ReaperConfig;
use crate::store::StoreConfig;

/// Convert config to [`StoreConfig`].
#[must_use]
pub fn to_store_config(cfg: &Config) -> StoreConfig {
    StoreConfig {
        lock_timeout: Duration::from_millis(cfg.store.lock_timeout_ms),
    }
}

/// Convert config to [`ReaperConfig`].
#[must_use]
pub fn to_reaper_config(cfg: &Config) -> ReaperConfig {
    ReaperConfig {
        enabled: cfg.retention.reaper_enabled,
        interval: Duration::from_secs(cfg.retention.reaper_interval_secs),
        tombstone_grace: Duration::from_secs(cfg.retention.tombstone_grace_secs),
    }
}

/// Convert config to [`LogConfig`].
#[must_use]
pub fn to_log_config(cfg: &Config) -> LogConfig {
    let format = match cfg.logging.format.as_str() {
        "pretty" => LogFormat::Pretty,
        "json" => LogFormat::Json,
        "full" => LogFormat::Full,
        _ => LogFormat::Compact,
    };

    let mut log_config = LogConfig::new(&cfg.logging.level).with_format(format);

    for directive in &cfg.logging.directives {
        log_config = log_config.with_directive(directive);
    }

    log_config
}

/// Convert one `[agents.<id>.policies]` table to a [`PolicyConfig`].
///
/// Regexes and limits are checked later, when the policy is installed.
#[must_use]
pub fn to_policy_config(section: &PolicySection) -> PolicyConfig {
    PolicyConfig {
        block_pii: section.block_pii,
        block_secrets: section.block_secrets,
        custom_blocked_patterns: section
            .custom_blocked_patterns
            .iter()
            .map(|p| CustomPattern::new(&p.name, &p.regex))
            .collect(),
        retention_days: section.retention_days,
        retention_by_prefix: section.retention_by_prefix.clone(),
        allowed_key_prefixes: section.allowed_key_prefixes.iter().cloned().collect(),
        denied_key_prefixes: section.denied_key_prefixes.iter().cloned().collect(),
        max_value_size_bytes: section.max_value_size_bytes,
        max_keys_per_agent: section.max_keys_per_agent,
    }
}

/// Install every configured agent policy into `registry`.
///
/// Returns the number of agents seeded.
///
/// # Errors
///
/// Returns an error if an agent id is invalid or a policy fails validation.
/// Agents before the failing one stay installed.
pub fn seed_policies(cfg: &Config, registry: &PolicyRegistry) -> RuntimeResult<usize> {
    let mut seeded = 0usize;
    for (id, agent) in &cfg.agents {
        let agent_id = AgentId::new(id.as_str())?;
        let version = registry.update(&agent_id, to_policy_config(&agent.policies))?;
        info!(agent_id = %agent_id, version = %version, "Seeded policy from config");
        seeded = seeded.saturating_add(1);
    }
    Ok(seeded)
}

/// Open the audit log selected by `[audit]`.
///
/// # Errors
///
/// Returns [`crate::RuntimeError::Config`] for an unknown backend or a file backend
/// without a path, and an audit error if the directory cannot be opened.
pub fn build_audit_log(cfg: &Config, clock: Arc<dyn Clock>) -> RuntimeResult<AuditLog> {
    validate_audit(cfg)?;
    match (cfg.audit.backend.as_str(), cfg.audit.path.as_deref()) {
        ("file", Some(path)) => Ok(AuditLog::open(path, clock)?),
        _ => Ok(AuditLog::in_memory(clock)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_config::{AgentSection, CustomPatternSection};
    use anchor_core::SystemClock;
    use anchor_policy::PolicySource;

    use crate::error::RuntimeError;

    fn agent_config(policies: PolicySection) -> Config {
        let mut cfg = Config::default();
        cfg.agents
            .insert("support_bot".to_owned(), AgentSection { policies });
        cfg
    }

    #[test]
    fn test_store_and_reaper_config() {
        let mut cfg = Config::default();
        cfg.store.lock_timeout_ms = 250;
        cfg.retention.reaper_enabled = false;
        cfg.retention.reaper_interval_secs = 5;

        assert_eq!(
            to_store_config(&cfg).lock_timeout,
            Duration::from_millis(250)
        );
        let reaper = to_reaper_config(&cfg);
        assert!(!reaper.enabled);
        assert_eq!(reaper.interval, Duration::from_secs(5));
        assert_eq!(reaper.tombstone_grace, Duration::from_secs(86_400));
    }

    #[test]
    fn test_log_config_mapping() {
        let mut cfg = Config::default();
        cfg.logging.level = "debug".into();
        cfg.logging.format = "json".into();
        cfg.logging.directives = vec!["anchor_audit=trace".into()];

        let log = to_log_config(&cfg);
        assert_eq!(log.level, "debug");
        assert_eq!(log.format, LogFormat::Json);
        assert_eq!(log.directives, vec!["anchor_audit=trace"]);
    }

    #[test]
    fn test_policy_section_mapping() {
        let section = PolicySection {
            block_pii: true,
            custom_blocked_patterns: vec![CustomPatternSection {
                name: "ticket_ref".into(),
                regex: "TICKET-[0-9]{6}".into(),
            }],
            allowed_key_prefixes: vec!["user:".into(), "user:".into()],
            retention_days: Some(30),
            ..PolicySection::default()
        };

        let policy = to_policy_config(&section);
        assert!(policy.block_pii);
        assert!(!policy.block_secrets);
        assert_eq!(policy.custom_blocked_patterns[0].name, "ticket_ref");
        assert_eq!(policy.allowed_key_prefixes.len(), 1);
        assert_eq!(policy.retention_days, Some(30));
    }

    #[test]
    fn test_seed_policies_installs_each_agent() {
        let cfg = agent_config(PolicySection {
            block_secrets: true,
            ..PolicySection::default()
        });
        let registry = PolicyRegistry::new(Arc::new(SystemClock));

        assert_eq!(seed_policies(&cfg, &registry).unwrap(), 1);
        let agent = AgentId::new("support_bot").unwrap();
        assert!(registry.current(&agent).unwrap().config().block_secrets);
    }

    #[test]
    fn test_seed_policies_rejects_bad_regex() {
        let cfg = agent_config(PolicySection {
            custom_blocked_patterns: vec![CustomPatternSection {
                name: "broken".into(),
                regex: "(unclosed".into(),
            }],
            ..PolicySection::default()
        });
        let registry = PolicyRegistry::new(Arc::new(SystemClock));
        assert!(seed_policies(&cfg, &registry).is_err());
    }

    #[test]
    fn test_build_audit_log_backends() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let memory = build_audit_log(&Config::default(), Arc::clone(&clock)).unwrap();
        assert!(memory.agents().unwrap().is_empty());

        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.audit.backend = "file".into();
        cfg.audit.path = Some(dir.path().display().to_string());
        let file = build_audit_log(&cfg, clock).unwrap();
        assert!(file.agents().unwrap().is_empty());
    }

    #[test]
    fn test_file_backend_without_path_is_rejected() {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let mut cfg = Config::default();
        cfg.audit.backend = "file".into();
        let err = build_audit_log(&cfg, Arc::clone(&clock)).unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
        assert!(err.to_string().contains("audit.path"));

        cfg.audit.path = Some("  ".into());
        assert!(build_audit_log(&cfg, Arc::clone(&clock)).is_err());

        cfg.audit.backend = "postgres".into();
        cfg.audit.path = None;
        assert!(matches!(
            build_audit_log(&cfg, clock),
            Err(RuntimeError::Config(_))
        ));
    }
}
