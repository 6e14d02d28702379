//! Decisions and reason codes.

use std::fmt;
use std::str::FromStr;

use anchor_core::Timestamp;
use serde::{Deserialize, Serialize};

/// Why a write was denied.
///
/// Variants are listed in evaluation order. The string form
/// (`prefix_denied`, `custom_pattern_matched:<name>`, ...) is only produced
/// at the boundary: `Display`, serde and audit metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReasonCode {
    /// Key starts with a denied prefix.
    PrefixDenied,
    /// An allow-list is configured and the key matches none of it.
    PrefixNotAllowed,
    /// Value exceeds `max_value_size_bytes`.
    ValueTooLarge,
    /// Value contains personally identifiable information.
    PiiDetected,
    /// Value contains a credential or secret.
    SecretDetected,
    /// Value matches the named custom pattern.
    CustomPatternMatched(String),
    /// Writing a new key would exceed `max_keys_per_agent`.
    KeyLimitExceeded,
}

const CUSTOM_PREFIX: &str = "custom_pattern_matched:";

impl ReasonCode {
    /// Stable machine-readable form.
    #[must_use]
    pub fn as_code(&self) -> String {
        match self {
            Self::PrefixDenied => "prefix_denied".to_owned(),
            Self::PrefixNotAllowed => "prefix_not_allowed".to_owned(),
            Self::ValueTooLarge => "value_too_large".to_owned(),
            Self::PiiDetected => "pii_detected".to_owned(),
            Self::SecretDetected => "secret_detected".to_owned(),
            Self::CustomPatternMatched(name) => format!("{CUSTOM_PREFIX}{name}"),
            Self::KeyLimitExceeded => "key_limit_exceeded".to_owned(),
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_code())
    }
}

/// Error returned when parsing an unknown reason code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown reason code: {0}")]
pub struct UnknownReasonCode(pub String);

impl FromStr for ReasonCode {
    type Err = UnknownReasonCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prefix_denied" => Ok(Self::PrefixDenied),
            "prefix_not_allowed" => Ok(Self::PrefixNotAllowed),
            "value_too_large" => Ok(Self::ValueTooLarge),
            "pii_detected" => Ok(Self::PiiDetected),
            "secret_detected" => Ok(Self::SecretDetected),
            "key_limit_exceeded" => Ok(Self::KeyLimitExceeded),
            other => other
                .strip_prefix(CUSTOM_PREFIX)
                .filter(|name| !name.is_empty())
                .map(|name| Self::CustomPatternMatched(name.to_owned()))
                .ok_or_else(|| UnknownReasonCode(other.to_owned())),
        }
    }
}

impl TryFrom<String> for ReasonCode {
    type Error = UnknownReasonCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReasonCode> for String {
    fn from(code: ReasonCode) -> Self {
        code.as_code()
    }
}

/// Outcome of evaluating a write against a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the write may be committed.
    pub allowed: bool,
    /// Why the write was denied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
    /// The rule, prefix or pattern that fired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    /// When the entry expires, for allowed writes under a retention policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
}

impl Decision {
    /// An allowed decision.
    #[must_use]
    pub fn allow(expires_at: Option<Timestamp>) -> Self {
        Self {
            allowed: true,
            reason: None,
            matched_rule: None,
            expires_at,
        }
    }

    /// A denied decision.
    #[must_use]
    pub fn deny(reason: ReasonCode, matched_rule: Option<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            matched_rule,
            expires_at: None,
        }
    }

    /// Whether this decision denies the write.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        !self.allowed
    }
}
