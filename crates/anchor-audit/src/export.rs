//! Export of audit chains.
//!
//! Two encodings:
//!
//! - `json`: one document `{agent_id, exported_at, events, verification?}`
//! - `jsonl`: one event per line, then an optional
//!   `{"verification": {...}}` line
//!
//! Both carry every hashed field, so [`verify_events`](crate::verify_events)
//! can re-check an export without access to the original log.

use std::fmt;
use std::str::FromStr;

use anchor_core::{AgentId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AuditError, AuditResult};
use crate::event::AuditEvent;
use crate::verify::ChainVerification;

/// Export encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Single JSON document.
    #[default]
    Json,
    /// Newline-delimited JSON.
    Jsonl,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Jsonl => write!(f, "jsonl"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "jsonl" | "ndjson" => Ok(Self::Jsonl),
            _ => Err(AuditError::UnknownFormat(s.to_owned())),
        }
    }
}

/// An agent's chain as exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditExport {
    /// Agent the chain belongs to.
    pub agent_id: AgentId,
    /// When the export was taken.
    pub exported_at: Timestamp,
    /// Events in creation order.
    pub events: Vec<AuditEvent>,
    /// Verification result at export time, if requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<ChainVerification>,
}

#[derive(Serialize, Deserialize)]
struct VerificationLine {
    verification: ChainVerification,
}

impl AuditExport {
    /// Encode the export.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render(&self, format: ExportFormat) -> AuditResult<String> {
        match format {
            ExportFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| AuditError::Serialization(e.to_string())),
            ExportFormat::Jsonl => {
                let mut out = String::new();
                for event in &self.events {
                    out.push_str(
                        &serde_json::to_string(event)
                            .map_err(|e| AuditError::Serialization(e.to_string()))?,
                    );
                    out.push('\n');
                }
                if let Some(verification) = &self.verification {
                    out.push_str(
                        &serde_json::to_string(&VerificationLine {
                            verification: verification.clone(),
                        })
                        .map_err(|e| AuditError::Serialization(e.to_string()))?,
                    );
                    out.push('\n');
                }
                Ok(out)
            },
        }
    }
}

/// Events and recorded verification read back from an export.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExport {
    /// Encoding the input was in.
    pub format: ExportFormat,
    /// Agent named by the export, or by its first event.
    pub agent_id: Option<AgentId>,
    /// Events in file order.
    pub events: Vec<AuditEvent>,
    /// Verification recorded at export time.
    pub verification: Option<ChainVerification>,
}

/// Parse an export in either encoding.
///
/// A JSONL file may also be a raw per-agent audit file, which has the same
/// line format without the verification line.
///
/// # Errors
///
/// Returns [`AuditError::Serialization`] naming the offending line.
pub fn parse_export(text: &str) -> AuditResult<ParsedExport> {
    if let Ok(export) = serde_json::from_str::<AuditExport>(text) {
        return Ok(ParsedExport {
            format: ExportFormat::Json,
            agent_id: Some(export.agent_id),
            events: export.events,
            verification: export.verification,
        });
    }

    let mut events: Vec<AuditEvent> = Vec::new();
    let mut verification = None;
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_error = |e: serde_json::Error| {
            AuditError::Serialization(format!("line {}: {e}", index.saturating_add(1)))
        };

        let value: Value = serde_json::from_str(line).map_err(line_error)?;
        if value.get("verification").is_some() && value.get("id").is_none() {
            let parsed: VerificationLine = serde_json::from_value(value).map_err(line_error)?;
            verification = Some(parsed.verification);
        } else {
            events.push(serde_json::from_value(value).map_err(line_error)?);
        }
    }

    Ok(ParsedExport {
        format: ExportFormat::Jsonl,
        agent_id: events.first().map(|e| e.agent_id.clone()),
        events,
        verification,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AuditOperation, AuditOutcome, AuditRecord};
    use crate::verify::verify_events;
    use anchor_crypto::ContentHash;

    fn export(with_verification: bool) -> AuditExport {
        let agent = AgentId::new("agent_1").unwrap();
        let first = AuditEvent::seal(
            agent.clone(),
            0,
            AuditRecord::new(AuditOperation::DataWrite, "k", AuditOutcome::Allowed),
            Timestamp::now(),
            ContentHash::genesis(),
        )
        .unwrap();
        let second = AuditEvent::seal(
            agent.clone(),
            1,
            AuditRecord::new(AuditOperation::DataDelete, "k", AuditOutcome::Success),
            Timestamp::now(),
            first.hash,
        )
        .unwrap();
        let events = vec![first, second];
        AuditExport {
            agent_id: agent,
            exported_at: Timestamp::now(),
            verification: with_verification.then(|| verify_events(&events)),
            events,
        }
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("jsonl".parse::<ExportFormat>().unwrap(), ExportFormat::Jsonl);
        assert!("csv".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let original = export(true);
        let parsed = parse_export(&original.render(ExportFormat::Json).unwrap()).unwrap();
        assert_eq!(parsed.format, ExportFormat::Json);
        assert_eq!(parsed.events, original.events);
        assert_eq!(parsed.verification, original.verification);
        assert!(verify_events(&parsed.events).valid);
    }

    #[test]
    fn test_jsonl_has_trailing_verification_line() {
        let original = export(true);
        let text = original.render(ExportFormat::Jsonl).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().last().unwrap().starts_with("{\"verification\""));

        let parsed = parse_export(&text).unwrap();
        assert_eq!(parsed.format, ExportFormat::Jsonl);
        assert_eq!(parsed.events.len(), 2);
        assert_eq!(parsed.agent_id.unwrap().as_str(), "agent_1");
        assert!(parsed.verification.unwrap().valid);
    }

    #[test]
    fn test_jsonl_without_verification() {
        let text = export(false).render(ExportFormat::Jsonl).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(parse_export(&text).unwrap().verification.is_none());
    }

    #[test]
    fn test_bad_line_reported() {
        let err = parse_export("{\"id\": 1}\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
