//! Netlaunch Telemetry - Logging and launch spans for the bundle loader.
//!
//! This crate provides:
//! - Configurable logging setup with multiple formats and targets
//! - Launch spans correlating a loader construction with its extensions
//! - Conversion from the `[logging]` configuration section
//!
//! # Example
//!
//! ```rust,no_run
//! use netlaunch_telemetry::{LaunchSpan, LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), netlaunch_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Pretty)
//!     .with_directive("netlaunch_loader=trace");
//!
//! setup_logging(&config)?;
//!
//! let _guard = LaunchSpan::new("editor", "https://apps.example.com/editor.jnlp").enter();
//! tracing::info!("Constructing loader");
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

mod context;
mod error;
mod logging;

pub use context::{LaunchGuard, LaunchSpan};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
