//! Wire envelopes exchanged with the editor.
//!
//! Every frame is one JSON object:
//!
//! ```text
//! request  {type, correlationId, timestamp, frame:"request", ...fields}
//! response {type, correlationId, timestamp, success, data | error}
//! event    {type, timestamp, data}
//! ```
//!
//! Outbound frames always carry the `frame` tag. Inbound frames are
//! classified by field presence: a frame with neither `correlationId` nor
//! `success` is an event, anything else is a response. Existing editors do
//! not send the tag, so a tag that contradicts the presence rule is logged
//! and ignored.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::{ErrorBody, ErrorCode};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Keys owned by the envelope. Command fields with these names are dropped.
const RESERVED_KEYS: [&str; 4] = ["type", "correlationId", "timestamp", "frame"];

/// Explicit frame discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Request,
    Response,
    Event,
}

impl FrameKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "request" => Some(FrameKind::Request),
            "response" => Some(FrameKind::Response),
            "event" => Some(FrameKind::Event),
            _ => None,
        }
    }
}

/// Frame timestamp. Outbound frames use RFC 3339; editors may send epoch millis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Millis(i64),
    Text(String),
}

impl WireTimestamp {
    pub fn now() -> Self {
        WireTimestamp::Text(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

/// Errors turning a caller value into a [`CommandRequest`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("command must be a JSON object")]
    NotAnObject,
    #[error("command is missing a string `type` field")]
    MissingType,
}

/// Errors decoding an inbound frame. All of them are non-fatal.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("frame does not match the {kind:?} envelope: {source}")]
    Shape {
        kind: FrameKind,
        /// Set when an undecodable response still names its request.
        correlation_id: Option<CorrelationId>,
        #[source]
        source: serde_json::Error,
    },
}

impl FrameError {
    /// Correlation ID of a response frame that failed to decode.
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        match self {
            FrameError::Shape { correlation_id, .. } => correlation_id.as_ref(),
            _ => None,
        }
    }
}

/// A command as handed over by the catalog layer: a type plus its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    kind: String,
    fields: Map<String, Value>,
}

impl CommandRequest {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// Add a command field. Envelope keys are ignored.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if !RESERVED_KEYS.contains(&key.as_str()) {
            self.fields.insert(key, value.into());
        }
        self
    }

    /// Build from a JSON object such as `{"type":"create_rectangle","x":10}`.
    pub fn from_value(value: Value) -> Result<Self, CommandError> {
        let Value::Object(mut fields) = value else {
            return Err(CommandError::NotAnObject);
        };
        let kind = match fields.remove("type") {
            Some(Value::String(kind)) if !kind.is_empty() => kind,
            _ => return Err(CommandError::MissingType),
        };
        fields.retain(|key, _| !RESERVED_KEYS.contains(&key.as_str()));
        Ok(Self { kind, fields })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Outbound request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub correlation_id: CorrelationId,
    pub timestamp: WireTimestamp,
    pub frame: FrameKind,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RequestEnvelope {
    /// Stamp a command with its correlation ID and the current time.
    pub fn stamp(command: CommandRequest, correlation_id: CorrelationId) -> Self {
        Self {
            kind: command.kind,
            correlation_id,
            timestamp: WireTimestamp::now(),
            frame: FrameKind::Request,
            fields: command.fields,
        }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Response frame. Also used for the synthetic failures the bridge produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<WireTimestamp>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ResponseEnvelope {
    /// Synthetic failure produced locally (not connected, timeout, internal).
    pub fn failure(
        kind: impl Into<String>,
        correlation_id: Option<CorrelationId>,
        error: ErrorBody,
    ) -> Self {
        Self {
            kind: kind.into(),
            correlation_id,
            timestamp: Some(WireTimestamp::now()),
            success: false,
            data: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn error_code(&self) -> Option<&ErrorCode> {
        self.error.as_ref().map(|e| &e.code)
    }

    /// Split into the caller-facing result.
    pub fn into_result(self) -> Result<Option<Value>, ErrorBody> {
        if self.success {
            Ok(self.data)
        } else {
            Err(self.error.unwrap_or_else(|| {
                ErrorBody::new(
                    ErrorCode::Editor("UNKNOWN".to_string()),
                    "Editor reported failure without an error body",
                )
            }))
        }
    }
}

/// Unsolicited editor notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<WireTimestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Any other top-level fields the editor attached.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Response(ResponseEnvelope),
    Event(EventEnvelope),
}

impl InboundFrame {
    pub fn kind(&self) -> FrameKind {
        match self {
            InboundFrame::Response(_) => FrameKind::Response,
            InboundFrame::Event(_) => FrameKind::Event,
        }
    }
}

/// Parse and classify one inbound text frame.
pub fn classify(raw: &str) -> Result<InboundFrame, FrameError> {
    let value: Value = serde_json::from_str(raw).map_err(FrameError::Malformed)?;
    classify_value(value)
}

/// Classify an already-parsed frame.
pub fn classify_value(value: Value) -> Result<InboundFrame, FrameError> {
    let Value::Object(mut map) = value else {
        return Err(FrameError::NotAnObject);
    };

    let tag = map.remove("frame");
    let kind = if map.contains_key("correlationId") || map.contains_key("success") {
        FrameKind::Response
    } else {
        FrameKind::Event
    };

    if let Some(tagged) = tag.as_ref().and_then(Value::as_str).and_then(FrameKind::from_tag) {
        if tagged != kind {
            warn!(
                tag = ?tagged,
                classified = ?kind,
                "Frame tag contradicts field layout, using field layout"
            );
        }
    }

    match kind {
        FrameKind::Event => serde_json::from_value(Value::Object(map))
            .map(InboundFrame::Event)
            .map_err(|source| FrameError::Shape {
                kind,
                correlation_id: None,
                source,
            }),
        _ => {
            let correlation_id = map
                .get("correlationId")
                .and_then(Value::as_str)
                .map(CorrelationId::from_wire);
            if !map.contains_key("success") {
                let has_error = map.get("error").is_some_and(|e| !e.is_null());
                map.insert("success".to_string(), Value::Bool(!has_error));
            }
            serde_json::from_value(Value::Object(map))
                .map(InboundFrame::Response)
                .map_err(|source| FrameError::Shape {
                    kind,
                    correlation_id,
                    source,
                })
        }
    }
}
