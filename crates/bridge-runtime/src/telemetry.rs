//! Logging setup.
//!
//! Logs go to stderr; stdout is reserved for the stdin command driver.

use crate::config::LoggingConfig;
use anyhow::{anyhow, Result};
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "BRIDGE_LOG_LEVEL";
pub const ENV_JSON_LOGS: &str = "BRIDGE_JSON_LOGS";

/// Resolved logging configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// EnvFilter directive
    pub log_level: String,
    /// JSON formatted logs
    pub json_logs: bool,
}

impl TelemetryConfig {
    /// Resolve from the process environment over the file settings.
    ///
    /// # Environment Variables
    ///
    /// - `BRIDGE_LOG_LEVEL` or `RUST_LOG`: filter directive
    /// - `BRIDGE_JSON_LOGS`: `true`/`1` for JSON output
    pub fn from_env(base: &LoggingConfig) -> Self {
        Self::from_lookup(base, |key| env::var(key).ok())
    }

    pub fn from_lookup<F>(base: &LoggingConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            log_level: lookup(ENV_LOG_LEVEL)
                .or_else(|| lookup("RUST_LOG"))
                .unwrap_or_else(|| base.level.clone()),
            json_logs: lookup(ENV_JSON_LOGS)
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(base.json),
        }
    }
}

/// Install the global subscriber.
pub fn init_tracing(config: &TelemetryConfig) -> Result<()> {
    let env_filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| anyhow!("invalid log filter {:?}: {}", config.log_level, e))?;

    if config.json_logs {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))?;
    }

    Ok(())
}
