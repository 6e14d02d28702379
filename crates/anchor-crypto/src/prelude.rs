//! Prelude module - commonly used types for convenient import.
//!
//! Use `use anchor_crypto::prelude::*;` to import all essential types.

// Errors
pub use crate::{CryptoError, CryptoResult};

// Hashing
pub use crate::ContentHash;
