//! Anchor Core - Foundation types for the Anchor governance core.
//!
//! This crate provides:
//! - [`AgentId`], the owner of every entry, audit chain and checkpoint
//! - [`Timestamp`], the single time representation used in hashed data
//! - The [`Clock`] trait, injected per store so that nothing reads
//!   process-wide time implicitly

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod clock;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult};
pub use types::{AgentId, Timestamp};
