//! Bulwark Telemetry - logging setup for processes embedding Bulwark.
//!
//! Library crates only emit `tracing` events; the binary that hosts them calls
//! [`setup_logging`] once at startup.
//!
//! # Example
//!
//! ```rust,no_run
//! use bulwark_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), bulwark_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("bulwark_approval=debug");
//!
//! setup_logging(&config)?;
//! tracing::info!("sandbox ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
