//! # Editor Bridge Runtime
//!
//! Hosts an [`editor_bridge::EditorBridge`] as a process.
//!
//! ## Startup Sequence
//!
//! 1. Parse flags, load configuration (file → env → flags)
//! 2. Install logging, then report environment overrides that were skipped
//! 3. Start the editor listener (bind failure aborts with the cause)
//! 4. Log editor events; optionally drive commands from stdin
//! 5. On SIGINT/SIGTERM (or stdin EOF in driver mode): stop the bridge

pub mod config;
pub mod driver;
pub mod telemetry;

pub use config::{load_config, Cli, IgnoredOverride, LoggingConfig, RuntimeConfig};
pub use driver::run_command_driver;
pub use telemetry::{init_tracing, TelemetryConfig};
