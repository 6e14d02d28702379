//! Anchor Policy - Content inspection and write evaluation.
//!
//! This crate decides whether a governed write may be committed:
//!
//! - [`PatternMatcher`] finds PII, secrets and custom patterns in a value
//! - [`CompiledPolicy`] validates a [`PolicyConfig`] and compiles its rules
//! - [`PolicyEngine`] runs the ordered checks and produces a [`Decision`]
//! - [`PolicyRegistry`] keeps versioned policies per agent and serves the
//!   current one through [`PolicySource`]
//!
//! Evaluation is pure. The same request, policy and `now` always produce the
//! same decision and expiry.
//!
//! # Example
//!
//! ```
//! use anchor_policy::{PatternMatcher, RuleSet};
//!
//! let matches = PatternMatcher::find_all("ssn 123-45-6789", RuleSet::pii());
//! assert_eq!(matches[0].rule_name, "ssn");
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod compiled;
pub mod config;
pub mod decision;
pub mod engine;
/// Error types and results for policy handling.
pub mod error;
pub mod matcher;
pub mod registry;

pub use compiled::CompiledPolicy;
pub use config::{CustomPattern, PolicyConfig};
pub use decision::{Decision, ReasonCode, UnknownReasonCode};
pub use engine::{PolicyEngine, WriteRequest, expiry_for, value_size, value_text};
pub use error::{PolicyError, PolicyResult};
pub use matcher::{PatternMatch, PatternMatcher, Rule, RuleCategory, RuleSet};
pub use registry::{PolicyRecord, PolicyRegistry, PolicySource, PolicyVersion};
