//! Editor Bridge - correlated command/response channel to a live editor.
//!
//! An automation agent issues commands (`create_rectangle`, `get_scene`, ...)
//! to a visual editor that connects in over a WebSocket. Each command gets a
//! correlation ID; the editor echoes it in its reply, and the bridge hands the
//! reply back to the caller that is waiting on it. Frames without a
//! correlation ID are editor events and go to event subscribers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        EDITOR BRIDGE                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │   caller ──send()──► CommandGateway                           │
//! │                          │ stamp id + timestamp               │
//! │                          ▼                                    │
//! │                  ConnectionManager ──register──► Pending      │
//! │                          │                       Request      │
//! │                   outbound queue                 Table        │
//! │                          │                    (DashMap +      │
//! │                     writer task                oneshot +      │
//! │                  (frames + pings)              timers)        │
//! │                          │                          ▲         │
//! └──────────────────────────┼──────────────────────────┼─────────┘
//!                            ▼                          │ resolve
//!                     WebSocket (one editor)            │
//!                            │                          │
//!                       reader loop ──► Dispatcher ─────┘
//!                                          │
//!                                          └──► EventSubscribers
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use editor_bridge::{BridgeConfig, CommandRequest, EditorBridge};
//!
//! let bridge = EditorBridge::new(BridgeConfig::default())?;
//! bridge.start().await?;
//!
//! let response = bridge
//!     .gateway()
//!     .send(CommandRequest::new("get_scene"))
//!     .await;
//! ```
//!
//! # Guarantees
//!
//! - Every `send` resolves exactly once: with the editor's reply, or with a
//!   local `NOT_CONNECTED`, `TIMEOUT` or `INTERNAL_ERROR` failure.
//! - At most one editor is attached; others are closed with 1008.
//! - A disconnect fails every outstanding request with `NOT_CONNECTED`.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod domain;
pub mod gateway;
pub mod service;
pub mod ws;

pub use domain::{
    BridgeConfig, BridgeError, CommandRequest, ConfigError, CorrelationId, ErrorBody, ErrorCode,
    EventEnvelope, ResponseEnvelope,
};
pub use gateway::CommandGateway;
pub use service::EditorBridge;
pub use ws::{BridgeStatus, ConnectionStatus, EventSubscription, SubscriberError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
