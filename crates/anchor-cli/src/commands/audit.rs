//! Audit command - offline inspection and verification of exported chains.

use std::path::Path;

use anchor_audit::{ChainVerification, ParsedExport, parse_export, verify_events};
use anyhow::{Context, bail};
use colored::Colorize;

use crate::theme::Theme;

/// Read and parse an export file (JSON document or JSONL).
pub(crate) fn load_export(path: &Path) -> anyhow::Result<ParsedExport> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_export(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Recompute the chain of an export.
///
/// The verification stored in the export, if any, is reported alongside but
/// never trusted.
pub(crate) fn check_export(export: &ParsedExport) -> ChainVerification {
    verify_events(&export.events)
}

/// Verify an exported chain.
pub(crate) fn verify_audit_file(path: &Path, json: bool) -> anyhow::Result<()> {
    let export = load_export(path)?;
    let result = check_export(&export);

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_verification(path, &export, &result);
    }

    if !result.valid {
        bail!("audit chain in {} failed verification", path.display());
    }
    Ok(())
}

fn print_verification(path: &Path, export: &ParsedExport, result: &ChainVerification) {
    let agent = export
        .agent_id
        .as_ref()
        .map_or_else(|| "(empty)".to_owned(), ToString::to_string);

    println!("\n{}", Theme::header("Audit Verification"));
    println!("{}", Theme::kv("File", &path.display().to_string()));
    println!("{}", Theme::kv("Format", &export.format.to_string()));
    println!("{}", Theme::kv("Agent", &agent));
    println!("{}", Theme::separator());

    if result.valid {
        println!(
            "{}",
            Theme::success(&format!("Chain verified: {} events", result.events_checked))
        );
    } else {
        let at = result
            .first_invalid
            .as_ref()
            .map_or_else(String::new, |id| format!(" at event {id}"));
        println!(
            "{}",
            Theme::error(&format!(
                "Chain broken{at} after checking {} events",
                result.events_checked
            ))
        );
        if let Some(issue) = &result.issue {
            println!("  - {issue}");
        }
    }

    if let Some(recorded) = &export.verification
        && recorded.valid != result.valid
    {
        println!(
            "{}",
            Theme::warning("Verification recorded in the export disagrees with the recomputed result")
        );
    }
    println!();
}

/// Show the events of an exported chain.
///
/// With `limit`, only the most recent `limit` events are shown.
pub(crate) fn show_audit_file(path: &Path, limit: Option<usize>) -> anyhow::Result<()> {
    let export = load_export(path)?;
    if export.events.is_empty() {
        println!("{}", Theme::info("No audit events"));
        return Ok(());
    }

    let skip = limit.map_or(0, |n| export.events.len().saturating_sub(n));

    println!("\n{}", Theme::header("Audit Events"));
    println!(
        "{:>6} {:>19} {:<20} {:<8} {:<12} {}",
        "SEQ".dimmed(),
        "TIMESTAMP".dimmed(),
        "OPERATION".dimmed(),
        "RESULT".dimmed(),
        "HASH".dimmed(),
        "RESOURCE".dimmed()
    );
    println!("{}", Theme::separator());

    for event in export.events.iter().skip(skip) {
        println!(
            "{:>6} {:>19} {:<20} {:<8} {:<12} {}",
            event.sequence,
            Theme::timestamp(&event.timestamp.0),
            event.operation.as_str(),
            Theme::outcome(event.result),
            Theme::short(&event.hash.short()),
            event.resource
        );
    }

    if skip > 0 {
        println!(
            "{}",
            Theme::dimmed(&format!("({skip} earlier events not shown)"))
        );
    }
    println!();
    Ok(())
}
