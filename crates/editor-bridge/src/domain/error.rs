//! Bridge error types.
//!
//! Two families live here:
//! - [`ErrorCode`] / [`ErrorBody`]: failures reported in-band inside a failed
//!   response frame. Local codes are produced by the bridge itself, all other
//!   codes come from the editor and are passed through verbatim.
//! - [`BridgeError`]: lifecycle failures of the bridge (bind, double start).

use crate::domain::config::ConfigError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Wire codes produced locally by the bridge.
pub mod codes {
    pub const NOT_CONNECTED: &str = "NOT_CONNECTED";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

    // Used when an editor reports an error as a bare string.
    pub const EDITOR_ERROR: &str = "EDITOR_ERROR";
}

/// Error code carried in a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCode {
    /// No editor attached when the command was issued, or it left mid-flight.
    NotConnected,
    /// No reply observed within the request timeout.
    Timeout,
    /// Local serialization or socket failure.
    Internal,
    /// Editor-defined code, passed through untouched.
    Editor(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::NotConnected => codes::NOT_CONNECTED,
            ErrorCode::Timeout => codes::TIMEOUT,
            ErrorCode::Internal => codes::INTERNAL_ERROR,
            ErrorCode::Editor(code) => code,
        }
    }

    /// True for codes the bridge generates itself.
    pub fn is_local(&self) -> bool {
        !matches!(self, ErrorCode::Editor(_))
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            codes::NOT_CONNECTED => ErrorCode::NotConnected,
            codes::TIMEOUT => ErrorCode::Timeout,
            codes::INTERNAL_ERROR => ErrorCode::Internal,
            _ => ErrorCode::Editor(code),
        }
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Editor(code) => code,
            local => local.as_str().to_string(),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `error` object of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            details: None,
        }
    }

    pub fn not_connected() -> Self {
        Self::new(ErrorCode::NotConnected, "No editor is connected")
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("No reply within {}ms", after.as_millis()),
        )
    }

    pub fn internal(details: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Internal, format!("Internal error: {}", details))
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "[{}] {}", self.code, message),
            None => write!(f, "[{}]", self.code),
        }
    }
}

impl std::error::Error for ErrorBody {}

impl<'de> Deserialize<'de> for ErrorBody {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Editors in the wild send either the structured object or a bare
        // message string.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Helper {
            Structured {
                #[serde(default)]
                code: Option<serde_json::Value>,
                #[serde(default)]
                message: Option<String>,
                #[serde(default)]
                details: Option<serde_json::Value>,
            },
            Message(String),
        }

        Ok(match Helper::deserialize(deserializer)? {
            Helper::Structured {
                code,
                message,
                details,
            } => ErrorBody {
                code: ErrorCode::from(match code {
                    Some(serde_json::Value::String(code)) => code,
                    None | Some(serde_json::Value::Null) => codes::EDITOR_ERROR.to_string(),
                    Some(other) => other.to_string(),
                }),
                message,
                details,
            },
            Helper::Message(message) => ErrorBody {
                code: ErrorCode::Editor(codes::EDITOR_ERROR.to_string()),
                message: Some(message),
                details: None,
            },
        })
    }
}

/// Bridge lifecycle errors (not reported over the wire).
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The listening socket could not be bound. Fatal at startup.
    #[error("failed to bind editor listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// `start` called while the listener is already up.
    #[error("bridge listener already running on {0}")]
    AlreadyRunning(SocketAddr),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
