use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// A loaded configuration and the files it came from.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// The merged, validated configuration.
    pub config: Config,
    /// Files that contributed, lowest precedence first.
    pub loaded_files: Vec<String>,
    /// Number of `ANCHOR_*` overrides applied.
    pub env_overrides: usize,
}

/// Output format for displaying a configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShowFormat {
    /// TOML, as it would be written in a config file.
    #[default]
    Toml,
    /// Pretty-printed JSON.
    Json,
}

impl fmt::Display for ShowFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toml => write!(f, "toml"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for ShowFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::ValidationError {
                field: "format".to_owned(),
                message: format!("unsupported format '{other}'; expected toml or json"),
            }),
        }
    }
}

impl ResolvedConfig {
    /// Render the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::RenderError`] if serialization fails.
    pub fn render(&self, format: ShowFormat) -> ConfigResult<String> {
        match format {
            ShowFormat::Toml => toml::to_string_pretty(&self.config)
                .map_err(|e| ConfigError::RenderError(e.to_string())),
            ShowFormat::Json => serde_json::to_string_pretty(&self.config)
                .map_err(|e| ConfigError::RenderError(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved() -> ResolvedConfig {
        ResolvedConfig {
            config: Config::default(),
            loaded_files: Vec::new(),
            env_overrides: 0,
        }
    }

    #[test]
    fn test_toml_round_trips() {
        let text = resolved().render(ShowFormat::Toml).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_json_render() {
        let text = resolved().render(ShowFormat::Json).unwrap();
        assert!(text.contains("\"lock_timeout_ms\": 5000"));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("JSON".parse::<ShowFormat>().unwrap(), ShowFormat::Json);
        assert!("yaml".parse::<ShowFormat>().is_err());
    }
}
