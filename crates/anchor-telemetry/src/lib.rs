//! Anchor Telemetry - Logging setup for the Anchor governance core.
//!
//! Wraps `tracing-subscriber` with a small [`LogConfig`]: a level, a format,
//! a target and per-crate directives.
//!
//! # Example
//!
//! ```rust,no_run
//! use anchor_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), anchor_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("anchor_runtime=debug");
//!
//! setup_logging(&config)?;
//! tracing::info!(agent_id = "agent_1", "Store ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
