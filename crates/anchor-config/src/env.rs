//! `ANCHOR_*` environment overrides.
//!
//! Applied after every file layer, so they win over all of them. Values are
//! parsed into the field's TOML type here; a value that does not parse is a
//! validation error naming the variable.

use std::collections::HashMap;

use crate::error::{ConfigError, ConfigResult};
use crate::merge::set_path;

/// Expected type of an overridable field.
#[derive(Debug, Clone, Copy)]
enum Kind {
    Str,
    Int,
    Bool,
    List,
}

/// Environment variable, dotted config path, type.
const OVERRIDES: &[(&str, &str, Kind)] = &[
    ("ANCHOR_LOCK_TIMEOUT_MS", "store.lock_timeout_ms", Kind::Int),
    ("ANCHOR_REAPER_ENABLED", "retention.reaper_enabled", Kind::Bool),
    ("ANCHOR_REAPER_INTERVAL_SECS", "retention.reaper_interval_secs", Kind::Int),
    ("ANCHOR_TOMBSTONE_GRACE_SECS", "retention.tombstone_grace_secs", Kind::Int),
    ("ANCHOR_AUDIT_BACKEND", "audit.backend", Kind::Str),
    ("ANCHOR_AUDIT_PATH", "audit.path", Kind::Str),
    ("ANCHOR_LOG_LEVEL", "logging.level", Kind::Str),
    ("ANCHOR_LOG_FORMAT", "logging.format", Kind::Str),
    ("ANCHOR_LOG_DIRECTIVES", "logging.directives", Kind::List),
];

/// Snapshot the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars().collect()
}

fn parse(var: &str, raw: &str, kind: Kind) -> ConfigResult<toml::Value> {
    let invalid = |expected: &str| ConfigError::ValidationError {
        field: var.to_owned(),
        message: format!("expected {expected}, got '{raw}'"),
    };
    match kind {
        Kind::Str => Ok(toml::Value::String(raw.to_owned())),
        Kind::Int => raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|n| *n >= 0)
            .map(toml::Value::Integer)
            .ok_or_else(|| invalid("a non-negative integer")),
        Kind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(toml::Value::Boolean(true)),
            "0" | "false" | "no" | "off" => Ok(toml::Value::Boolean(false)),
            _ => Err(invalid("a boolean")),
        },
        Kind::List => Ok(toml::Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| toml::Value::String(s.to_owned()))
                .collect(),
        )),
    }
}

/// Apply every set `ANCHOR_*` override to the merged tree.
///
/// Returns how many overrides were applied.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] if a variable does not parse.
pub fn apply_env_overrides(
    merged: &mut toml::Value,
    env: &HashMap<String, String>,
) -> ConfigResult<usize> {
    let mut applied = 0_usize;
    for (var, path, kind) in OVERRIDES {
        if let Some(raw) = env.get(*var) {
            set_path(merged, path, parse(var, raw, *kind)?);
            applied = applied.saturating_add(1);
        }
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn tree() -> toml::Value {
        toml::from_str("[store]\nlock_timeout_ms = 5000").unwrap()
    }

    #[test]
    fn test_overrides_applied() {
        let mut merged = tree();
        let applied = apply_env_overrides(
            &mut merged,
            &env(&[
                ("ANCHOR_LOCK_TIMEOUT_MS", "250"),
                ("ANCHOR_REAPER_ENABLED", "off"),
                ("ANCHOR_LOG_DIRECTIVES", "anchor_runtime=debug, anchor_audit=trace"),
                ("UNRELATED", "x"),
            ]),
        )
        .unwrap();
        assert_eq!(applied, 3);
        assert_eq!(merged["store"]["lock_timeout_ms"].as_integer(), Some(250));
        assert_eq!(merged["retention"]["reaper_enabled"].as_bool(), Some(false));
        assert_eq!(merged["logging"]["directives"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_bad_integer_names_variable() {
        let err = apply_env_overrides(&mut tree(), &env(&[("ANCHOR_LOCK_TIMEOUT_MS", "-1")]))
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::ValidationError { ref field, .. } if field == "ANCHOR_LOCK_TIMEOUT_MS")
        );
    }

    #[test]
    fn test_bad_bool_rejected() {
        assert!(
            apply_env_overrides(&mut tree(), &env(&[("ANCHOR_REAPER_ENABLED", "maybe")])).is_err()
        );
    }
}
