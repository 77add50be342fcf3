//! Bridge configuration with validation.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default editor listener port.
pub const DEFAULT_PORT: u16 = 3001;

/// Default request timeout (10s).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default liveness ping interval (15s).
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_millis(15_000);

/// Default maximum inbound frame size (16 MiB). Scene snapshots get large.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Bind address for the editor listener
    pub host: IpAddr,
    /// Listener port (default: 3001)
    pub port: u16,
    /// How long a command waits for its reply
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// WebSocket ping interval while an editor is attached
    #[serde(with = "humantime_serde")]
    pub ping_interval: Duration,
    /// Largest inbound frame accepted from the editor, in bytes
    pub max_frame_size: usize,
    /// Upper bound on how long `stop` waits for the listener to drain
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            ping_interval: DEFAULT_PING_INTERVAL,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl BridgeConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request_timeout cannot be 0".into(),
            ));
        }

        if self.ping_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "ping_interval cannot be 0".into(),
            ));
        }

        if self.max_frame_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_frame_size cannot be 0".into(),
            ));
        }

        if self.shutdown_grace.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "shutdown_grace cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Listener address for a given port (the configured one or an override)
    pub fn listen_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.host, port)
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// Invalid interval value
    #[error("invalid interval: {0}")]
    InvalidInterval(String),
    /// Invalid size limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
}

/// Human-readable duration strings: `"10s"`, `"1500ms"`, `"2m"`, or plain seconds.
pub mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" has to be checked before the single-letter suffixes.
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
