//! Prelude module - commonly used types for convenient import.
//!
//! Use `use anchor_policy::prelude::*;` to import all essential types.

// Errors
pub use crate::{PolicyError, PolicyResult};

// Configuration
pub use crate::{CompiledPolicy, CustomPattern, PolicyConfig};

// Evaluation
pub use crate::{Decision, PolicyEngine, ReasonCode, WriteRequest};

// Matching
pub use crate::{PatternMatch, PatternMatcher, RuleCategory, RuleSet};

// Versions
pub use crate::{PolicyRegistry, PolicySource, PolicyVersion};
