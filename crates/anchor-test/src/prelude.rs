//! Prelude module - commonly used types for convenient import.
//!
//! Use `use anchor_test::prelude::*;` to import all essential types.

pub use crate::fixtures::*;
pub use crate::harness::*;
pub use crate::mocks::*;
