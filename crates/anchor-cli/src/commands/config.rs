//! CLI handlers for the `anchor config` subcommand.

use std::path::Path;

use anchor_config::{Config, ResolvedConfig, ShowFormat};
use anyhow::Result;

use crate::theme::Theme;

/// Show the resolved configuration.
pub(crate) fn show_config(explicit: Option<&Path>, format: &str) -> Result<()> {
    let resolved = Config::load(explicit)?;
    let show_format: ShowFormat = format.parse()?;
    println!("{}", render(&resolved, show_format)?);
    Ok(())
}

fn render(resolved: &ResolvedConfig, format: ShowFormat) -> Result<String> {
    let mut out = String::new();
    if format == ShowFormat::Toml {
        if resolved.loaded_files.is_empty() {
            out.push_str("# sources: embedded defaults\n");
        } else {
            for path in &resolved.loaded_files {
                out.push_str(&format!("# source: {path}\n"));
            }
        }
        if resolved.env_overrides > 0 {
            out.push_str(&format!(
                "# environment overrides: {}\n",
                resolved.env_overrides
            ));
        }
        out.push('\n');
    }
    out.push_str(&resolved.render(format)?);
    Ok(out)
}

/// Validate the configuration and list the files it came from.
pub(crate) fn validate_config(explicit: Option<&Path>) -> Result<()> {
    let resolved = Config::load(explicit)?;
    println!("{}", Theme::success("Configuration is valid"));
    for path in &resolved.loaded_files {
        println!("  - {path}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved() -> ResolvedConfig {
        ResolvedConfig {
            config: Config::default(),
            loaded_files: vec!["/etc/anchor/config.toml".into()],
            env_overrides: 2,
        }
    }

    #[test]
    fn test_toml_render_annotates_sources() {
        let text = render(&resolved(), ShowFormat::Toml).unwrap();
        assert!(text.starts_with("# source: /etc/anchor/config.toml\n"));
        assert!(text.contains("# environment overrides: 2"));
        assert!(text.contains("lock_timeout_ms = 5000"));
    }

    #[test]
    fn test_json_render_is_plain_json() {
        let text = render(&resolved(), ShowFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["audit"]["backend"], "memory");
    }
}
