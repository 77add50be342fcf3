//! Runtime configuration.
//!
//! Layering, later wins:
//!
//! 1. Built-in defaults
//! 2. TOML file (`--config`)
//! 3. Environment (`BRIDGE_*`)
//! 4. Command-line flags
//!
//! ```toml
//! [bridge]
//! host = "127.0.0.1"
//! port = 3001
//! request_timeout = "10s"
//! ping_interval = "15s"
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use editor_bridge::BridgeConfig;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const ENV_HOST: &str = "BRIDGE_HOST";
pub const ENV_PORT: &str = "BRIDGE_PORT";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "BRIDGE_REQUEST_TIMEOUT_MS";
pub const ENV_PING_INTERVAL_MS: &str = "BRIDGE_PING_INTERVAL_MS";

/// Command-line arguments
#[derive(Parser, Debug, Default, Clone)]
#[command(name = "bridge-runtime")]
#[command(version, about = "WebSocket bridge between an automation agent and a live editor")]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address the editor listener binds to
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// Editor listener port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Per-command reply timeout in milliseconds
    #[arg(long)]
    pub request_timeout_ms: Option<u64>,

    /// Liveness ping interval in milliseconds
    #[arg(long)]
    pub ping_interval_ms: Option<u64>,

    /// Read JSON commands from stdin (one per line), print responses to stdout
    #[arg(long)]
    pub stdin: bool,
}

/// Logging section of the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (trace, debug, info, warn, error, or an EnvFilter string)
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// An environment override that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredOverride {
    pub key: &'static str,
    pub value: String,
}

/// Everything the runtime needs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub bridge: BridgeConfig,
    pub logging: LoggingConfig,
    /// Overrides dropped by [`RuntimeConfig::apply_env`], reported once
    /// logging is up.
    #[serde(skip)]
    pub ignored_env: Vec<IgnoredOverride>,
}

impl RuntimeConfig {
    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Apply `BRIDGE_*` overrides. Unparseable values are skipped and
    /// collected in `ignored_env`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let ignored = &mut self.ignored_env;
        let bridge = &mut self.bridge;
        if let Some(host) = parse_var(&lookup, ENV_HOST, ignored) {
            bridge.host = host;
        }
        if let Some(port) = parse_var(&lookup, ENV_PORT, ignored) {
            bridge.port = port;
        }
        if let Some(ms) = parse_var(&lookup, ENV_REQUEST_TIMEOUT_MS, ignored) {
            bridge.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, ENV_PING_INTERVAL_MS, ignored) {
            bridge.ping_interval = Duration::from_millis(ms);
        }
    }

    /// Log the overrides `apply_env` skipped. Call after tracing is set up.
    pub fn report_ignored(&self) {
        for ignored in &self.ignored_env {
            warn!(
                key = ignored.key,
                value = %ignored.value,
                "Ignoring unparseable environment override"
            );
        }
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        let bridge = &mut self.bridge;
        if let Some(host) = cli.host {
            bridge.host = host;
        }
        if let Some(port) = cli.port {
            bridge.port = port;
        }
        if let Some(ms) = cli.request_timeout_ms {
            bridge.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = cli.ping_interval_ms {
            bridge.ping_interval = Duration::from_millis(ms);
        }
    }
}

/// Build the runtime configuration from all layers and validate it.
pub fn load_config<F>(cli: &Cli, lookup: F) -> Result<RuntimeConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match &cli.config {
        Some(path) => RuntimeConfig::from_file(path)?,
        None => RuntimeConfig::default(),
    };
    config.apply_env(lookup);
    config.apply_cli(cli);
    config
        .bridge
        .validate()
        .context("invalid bridge configuration")?;
    Ok(config)
}

fn parse_var<T, F>(
    lookup: &F,
    key: &'static str,
    ignored: &mut Vec<IgnoredOverride>,
) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            ignored.push(IgnoredOverride { key, value: raw });
            None
        }
    }
}
