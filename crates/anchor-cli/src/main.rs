//! Anchor CLI - Offline tools for the Anchor governance core.
//!
//! Verifies and displays exported audit trails, dry-runs writes against a
//! policy file, and shows the resolved configuration. It never touches a
//! running store.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;

mod commands;
mod theme;

use anchor_runtime::config_bridge;
use commands::{audit, config, policy};

/// Anchor - Governance core for agent data
#[derive(Parser)]
#[command(name = "anchor")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a configuration file, layered over the defaults
    #[arg(short, long, global = true, env = "ANCHOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and verify exported audit chains
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },

    /// Evaluate writes against a policy without a store
    Policy {
        #[command(subcommand)]
        command: PolicyCommands,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum AuditCommands {
    /// Verify the hash chain of an export (JSON or JSONL)
    Verify {
        /// Export file
        file: PathBuf,
        /// Print the verification result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the events of an export
    Show {
        /// Export file
        file: PathBuf,
        /// Show only the most recent N events
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand)]
enum PolicyCommands {
    /// Dry-run one write
    Check {
        /// Policy file (fields of an `[agents.<id>.policies]` table)
        #[arg(short, long)]
        policy: PathBuf,
        /// Key to write
        #[arg(short, long)]
        key: String,
        /// Value to write; parsed as JSON when possible
        #[arg(long)]
        value: String,
        /// Agent performing the write
        #[arg(short, long, default_value = "cli")]
        agent: String,
        /// Treat the key as already present
        #[arg(long)]
        key_exists: bool,
        /// Live keys the agent is assumed to hold
        #[arg(long, default_value_t = 0)]
        live_keys: u64,
        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the resolved configuration
    Show {
        /// Output format (toml or json)
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
    /// Validate the configuration
    Validate,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging from config, with --verbose override.
    let resolved = anchor_config::Config::load(cli.config.as_deref()).ok();
    let log_config = if let Some(resolved) = &resolved {
        let mut lc = config_bridge::to_log_config(&resolved.config);
        if cli.verbose {
            "debug".clone_into(&mut lc.level);
        }
        lc
    } else {
        let level = if cli.verbose { "debug" } else { "warn" };
        anchor_telemetry::LogConfig::new(level)
    };
    if let Err(e) = anchor_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }
    match &resolved {
        Some(resolved) => debug!(files = ?resolved.loaded_files, "Configuration loaded"),
        None => debug!("Configuration unavailable, logging at defaults"),
    }

    match cli.command {
        Commands::Audit { command } => handle_audit(command),
        Commands::Policy { command } => handle_policy(command),
        Commands::Config { command } => handle_config(command, cli.config.as_deref()),
    }
}

fn handle_audit(command: AuditCommands) -> Result<()> {
    match command {
        AuditCommands::Verify { file, json } => audit::verify_audit_file(&file, json),
        AuditCommands::Show { file, limit } => audit::show_audit_file(&file, limit),
    }
}

fn handle_policy(command: PolicyCommands) -> Result<()> {
    match command {
        PolicyCommands::Check {
            policy: policy_path,
            key,
            value,
            agent,
            key_exists,
            live_keys,
            json,
        } => policy::check_policy(
            &policy_path,
            &agent,
            &key,
            &value,
            policy::DryRunState {
                key_exists,
                live_keys,
            },
            json,
        ),
    }
}

fn handle_config(command: ConfigCommands, explicit: Option<&std::path::Path>) -> Result<()> {
    match command {
        ConfigCommands::Show { format } => config::show_config(explicit, &format),
        ConfigCommands::Validate => config::validate_config(explicit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_policy_check() {
        let cli = Cli::try_parse_from([
            "anchor", "policy", "check", "--policy", "p.toml", "--key", "user:email", "--value",
            "a@b.com", "--live-keys", "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Policy {
                command: PolicyCommands::Check {
                    key, live_keys, agent, ..
                },
            } => {
                assert_eq!(key, "user:email");
                assert_eq!(live_keys, 3);
                assert_eq!(agent, "cli");
            },
            _ => panic!("expected policy check"),
        }
    }

    #[test]
    fn test_parse_audit_show_limit() {
        let cli = Cli::try_parse_from(["anchor", "audit", "show", "trail.jsonl", "-l", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Audit {
                command: AuditCommands::Show { limit: Some(5), .. }
            }
        ));
    }
}
