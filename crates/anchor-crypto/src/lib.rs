//! Anchor Crypto - Hashing primitives for the governance core.
//!
//! This crate provides:
//! - BLAKE3 content hashing for audit chains
//! - The genesis hash that anchors every agent's chain
//! - Hex encoding used by exports and on-disk audit files
//!
//! # Example
//!
//! ```
//! use anchor_crypto::ContentHash;
//!
//! let first = ContentHash::link(&ContentHash::genesis(), b"event one");
//! let second = ContentHash::link(&first, b"event two");
//!
//! assert_ne!(first, second);
//! assert_eq!(ContentHash::from_hex(&second.to_hex()).unwrap(), second);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod hash;

pub use error::{CryptoError, CryptoResult};
pub use hash::ContentHash;
