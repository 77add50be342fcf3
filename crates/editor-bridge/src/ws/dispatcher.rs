//! Inbound frame routing.

use crate::domain::error::ErrorBody;
use crate::domain::messages::{classify, FrameError, InboundFrame};
use crate::domain::pending::PendingRequestTable;
use crate::ws::subscriptions::EventSubscribers;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Reply matched a pending request
    Resolved,
    /// Reply with a missing or unknown correlation ID
    Orphaned,
    /// Event delivered to this many healthy subscribers
    Event(usize),
    /// Reply named a pending request but could not be decoded; the request
    /// was failed with `INTERNAL_ERROR`
    Rejected,
    /// Frame could not be decoded
    Dropped,
}

/// Routes replies to the pending table and events to subscribers.
pub struct Dispatcher {
    pending: Arc<PendingRequestTable>,
    subscribers: Arc<EventSubscribers>,
}

impl Dispatcher {
    pub fn new(pending: Arc<PendingRequestTable>, subscribers: Arc<EventSubscribers>) -> Self {
        Self {
            pending,
            subscribers,
        }
    }

    /// Handle one text frame from the editor. Never fails.
    pub fn dispatch(&self, raw: &str) -> Dispatched {
        let frame = match classify(raw) {
            Ok(frame) => frame,
            Err(e) => return self.undecodable(raw, e),
        };

        match frame {
            InboundFrame::Event(event) => {
                debug!(event_type = %event.kind, "Editor event");
                Dispatched::Event(self.subscribers.publish(&event))
            }
            InboundFrame::Response(response) => {
                let Some(correlation_id) = response.correlation_id.clone() else {
                    warn!(
                        response_type = %response.kind,
                        "Dropping response without correlation ID"
                    );
                    return Dispatched::Orphaned;
                };
                if self.pending.resolve(&correlation_id, response) {
                    Dispatched::Resolved
                } else {
                    Dispatched::Orphaned
                }
            }
        }
    }

    fn undecodable(&self, raw: &str, error: FrameError) -> Dispatched {
        let Some(correlation_id) = error.correlation_id() else {
            warn!(error = %error, len = raw.len(), "Dropping undecodable frame");
            return Dispatched::Dropped;
        };

        warn!(
            correlation_id = %correlation_id,
            error = %error,
            "Failing request with undecodable reply"
        );
        let body = ErrorBody {
            details: Some(Value::String(raw.to_string())),
            ..ErrorBody::internal(format!("undecodable reply: {}", error))
        };
        if self.pending.fail(correlation_id, body) {
            Dispatched::Rejected
        } else {
            Dispatched::Orphaned
        }
    }
}
