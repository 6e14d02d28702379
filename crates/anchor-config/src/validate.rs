//! Post-merge configuration validation.
//!
//! Checks ranges and cross-field requirements of a deserialized
//! [`Config`](crate::Config). Policy contents (regexes, prefixes, limits) are
//! validated when the policies are installed, not here.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Upper bound for `store.lock_timeout_ms` (10 minutes).
const MAX_LOCK_TIMEOUT_MS: u64 = 600_000;

/// Validate a fully-merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_store(config)?;
    validate_retention(config)?;
    validate_audit(config)?;
    validate_logging(config)?;
    validate_agents(config)?;
    Ok(())
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

fn validate_store(config: &Config) -> ConfigResult<()> {
    let timeout = config.store.lock_timeout_ms;
    if timeout == 0 || timeout > MAX_LOCK_TIMEOUT_MS {
        return Err(invalid(
            "store.lock_timeout_ms",
            format!("lock_timeout_ms must be between 1 and {MAX_LOCK_TIMEOUT_MS}"),
        ));
    }
    Ok(())
}

fn validate_retention(config: &Config) -> ConfigResult<()> {
    if config.retention.reaper_interval_secs == 0 {
        return Err(invalid(
            "retention.reaper_interval_secs",
            "reaper_interval_secs must be at least 1",
        ));
    }
    Ok(())
}

/// Validate the `[audit]` section alone.
///
/// # Errors
///
/// Returns an error for an unknown backend or a file backend without a path.
pub fn validate_audit(config: &Config) -> ConfigResult<()> {
    match config.audit.backend.as_str() {
        "memory" => Ok(()),
        "file" => match config.audit.path.as_deref() {
            Some(path) if !path.trim().is_empty() => Ok(()),
            _ => Err(invalid(
                "audit.path",
                "the file backend requires a directory path",
            )),
        },
        other => Err(invalid(
            "audit.backend",
            format!("unsupported audit backend '{other}'; expected one of: memory, file"),
        )),
    }
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(invalid(
            "logging.level",
            format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        ));
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        ));
    }

    Ok(())
}

fn validate_agents(config: &Config) -> ConfigResult<()> {
    for id in config.agents.keys() {
        if id.trim().is_empty() {
            return Err(invalid("agents", "agent ids must not be empty"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_lock_timeout() {
        let mut config = Config::default();
        config.store.lock_timeout_ms = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("store.lock_timeout_ms"));
    }

    #[test]
    fn test_file_backend_needs_path() {
        let mut config = Config::default();
        config.audit.backend = "file".into();
        assert!(validate(&config).is_err());

        config.audit.path = Some("/var/lib/anchor/audit".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_backend() {
        let mut config = Config::default();
        config.audit.backend = "postgres".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_reaper_interval() {
        let mut config = Config::default();
        config.retention.reaper_interval_secs = 0;
        assert!(validate(&config).is_err());
    }
}
