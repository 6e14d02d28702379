//! Common types used throughout Anchor.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// Maximum length of an agent identifier in bytes.
const MAX_AGENT_ID_LEN: usize = 128;

/// Identifier of an agent, assigned by the external agent registry.
///
/// Agent ids name per-agent files on disk, so they are restricted to ASCII
/// alphanumerics plus `-`, `_`, `.` and `:`, and may not start with a dot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    /// Validate and wrap an agent identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidAgentId`] if the id is empty, too long,
    /// starts with a dot or contains characters outside the allowed set.
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        let reason = if id.is_empty() {
            Some("must not be empty")
        } else if id.len() > MAX_AGENT_ID_LEN {
            Some("must be at most 128 bytes")
        } else if id.starts_with('.') {
            Some("must not start with '.'")
        } else if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
        {
            Some("may only contain ASCII letters, digits, '-', '_', '.', ':'")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(CoreError::InvalidAgentId { id, reason }),
            None => Ok(Self(id)),
        }
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AgentId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AgentId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.0
    }
}

impl AsRef<str> for AgentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Timestamp wrapper for consistent handling throughout Anchor.
///
/// Serializes as RFC 3339, which round-trips exactly; audit hashes depend
/// on that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// Read the current wall-clock time.
    ///
    /// Library code takes time from an injected [`Clock`](crate::Clock)
    /// instead of calling this directly.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create a timestamp from a `DateTime<Utc>`.
    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Timestamp `days` days after this one, saturating at the maximum
    /// representable time.
    #[must_use]
    pub fn plus_days(&self, days: u32) -> Self {
        let delta = Duration::try_days(i64::from(days)).unwrap_or(Duration::MAX);
        Self(
            self.0
                .checked_add_signed(delta)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    /// Timestamp `delta` after this one, saturating at the maximum
    /// representable time.
    #[must_use]
    pub fn plus(&self, delta: Duration) -> Self {
        Self(
            self.0
                .checked_add_signed(delta)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    /// Whether this timestamp is at or before `now`.
    #[must_use]
    pub fn has_passed(&self, now: Timestamp) -> bool {
        self.0 <= now.0
    }

    /// Get the inner `DateTime<Utc>`.
    #[must_use]
    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%dT%H:%M:%SZ"))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}
