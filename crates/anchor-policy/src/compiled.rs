//! Validated, ready-to-evaluate policies.
//!
//! [`CompiledPolicy::compile`] is the only way to turn a [`PolicyConfig`]
//! into something the engine accepts. All validation happens here, so a
//! policy with a bad regex or a zero limit is rejected when it is installed
//! and never reaches a write.

use std::collections::HashSet;

use crate::config::PolicyConfig;
use crate::error::{PolicyError, PolicyResult};
use crate::matcher::{Rule, RuleCategory, RuleSet};

/// Maximum length of a custom pattern name.
const MAX_PATTERN_NAME_LEN: usize = 64;

/// A policy whose custom patterns have been compiled and whose fields have
/// been validated.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    config: PolicyConfig,
    custom_rules: RuleSet,
}

impl CompiledPolicy {
    /// Validate `config` and compile its custom patterns.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Validation`] naming the first offending field.
    pub fn compile(config: PolicyConfig) -> PolicyResult<Self> {
        validate_limits(&config)?;
        validate_prefixes(&config)?;
        let custom_rules = compile_custom_patterns(&config)?;
        Ok(Self {
            config,
            custom_rules,
        })
    }

    /// A policy that allows every write and sets no expiry.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            config: PolicyConfig::permissive(),
            custom_rules: RuleSet::default(),
        }
    }

    /// The configuration this policy was compiled from.
    #[must_use]
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Compiled custom patterns, in configured order.
    #[must_use]
    pub fn custom_rules(&self) -> &RuleSet {
        &self.custom_rules
    }
}

fn validate_limits(config: &PolicyConfig) -> PolicyResult<()> {
    if config.retention_days == Some(0) {
        return Err(PolicyError::validation(
            "retention_days",
            "must be at least 1",
        ));
    }
    if config.max_value_size_bytes == Some(0) {
        return Err(PolicyError::validation(
            "max_value_size_bytes",
            "must be at least 1",
        ));
    }
    if config.max_keys_per_agent == Some(0) {
        return Err(PolicyError::validation(
            "max_keys_per_agent",
            "must be at least 1",
        ));
    }
    Ok(())
}

fn validate_prefixes(config: &PolicyConfig) -> PolicyResult<()> {
    for (prefix, days) in &config.retention_by_prefix {
        if prefix.is_empty() {
            return Err(PolicyError::validation(
                "retention_by_prefix",
                "prefix must not be empty",
            ));
        }
        if *days == 0 {
            return Err(PolicyError::validation(
                format!("retention_by_prefix.{prefix}"),
                "must be at least 1",
            ));
        }
    }
    if config.allowed_key_prefixes.iter().any(String::is_empty) {
        return Err(PolicyError::validation(
            "allowed_key_prefixes",
            "prefix must not be empty",
        ));
    }
    if config.denied_key_prefixes.iter().any(String::is_empty) {
        return Err(PolicyError::validation(
            "denied_key_prefixes",
            "an empty prefix would deny every key",
        ));
    }
    Ok(())
}

fn compile_custom_patterns(config: &PolicyConfig) -> PolicyResult<RuleSet> {
    let mut seen = HashSet::new();
    let mut rules = Vec::with_capacity(config.custom_blocked_patterns.len());

    for (index, pattern) in config.custom_blocked_patterns.iter().enumerate() {
        let field = format!("custom_blocked_patterns[{index}]");

        if pattern.name.is_empty() {
            return Err(PolicyError::validation(
                format!("{field}.name"),
                "must not be empty",
            ));
        }
        if pattern.name.len() > MAX_PATTERN_NAME_LEN {
            return Err(PolicyError::validation(
                format!("{field}.name"),
                format!("must be at most {MAX_PATTERN_NAME_LEN} bytes"),
            ));
        }
        if !pattern
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(PolicyError::validation(
                format!("{field}.name"),
                "may only contain ASCII letters, digits, '_', '-', '.'",
            ));
        }
        if !seen.insert(pattern.name.as_str()) {
            return Err(PolicyError::validation(
                format!("{field}.name"),
                format!("duplicate pattern name '{}'", pattern.name),
            ));
        }
        if pattern.regex.is_empty() {
            return Err(PolicyError::validation(
                format!("{field}.regex"),
                "must not be empty",
            ));
        }

        let rule = Rule::pattern(&pattern.name, RuleCategory::Custom, &pattern.regex)
            .map_err(|e| PolicyError::validation(format!("{field}.regex"), e.to_string()))?;
        if rule.matches_empty() {
            return Err(PolicyError::validation(
                format!("{field}.regex"),
                "matches the empty string and would block every write",
            ));
        }
        rules.push(rule);
    }

    Ok(RuleSet::new(rules))
}
