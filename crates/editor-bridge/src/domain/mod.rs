//! Domain types for the editor bridge.
//!
//! Wire envelopes, correlation IDs, configuration, errors, and the pending
//! request table that pairs replies with callers.

pub mod config;
pub mod correlation;
pub mod error;
pub mod messages;
pub mod pending;

// Re-exports for convenience
pub use config::{BridgeConfig, ConfigError};
pub use correlation::CorrelationId;
pub use error::{codes, BridgeError, ErrorBody, ErrorCode};
pub use messages::{
    classify, CommandError, CommandRequest, EventEnvelope, FrameError, FrameKind, InboundFrame,
    RequestEnvelope, ResponseEnvelope, WireTimestamp,
};
pub use pending::{PendingReceiver, PendingRequestTable, PendingStatsSnapshot};
