//! Command gateway: the caller-facing `send`.
//!
//! Every call resolves to exactly one [`ResponseEnvelope`]. Local failures
//! (`NOT_CONNECTED`, `TIMEOUT`, `INTERNAL_ERROR`) come back in-band as
//! failed responses, never as `Err`.

use crate::domain::correlation::CorrelationId;
use crate::domain::error::ErrorBody;
use crate::domain::messages::{CommandRequest, RequestEnvelope, ResponseEnvelope};
use crate::ws::connection::{ConnectionManager, Submission};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Sends commands to the editor and awaits their replies.
#[derive(Clone)]
pub struct CommandGateway {
    connection: Arc<ConnectionManager>,
    default_timeout: Duration,
}

impl CommandGateway {
    pub fn new(connection: Arc<ConnectionManager>, default_timeout: Duration) -> Self {
        Self {
            connection,
            default_timeout,
        }
    }

    /// Send a command with the configured request timeout.
    pub async fn send(&self, command: CommandRequest) -> ResponseEnvelope {
        self.send_with_timeout(command, self.default_timeout).await
    }

    /// Send a command with an explicit timeout.
    pub async fn send_with_timeout(
        &self,
        command: CommandRequest,
        timeout: Duration,
    ) -> ResponseEnvelope {
        let envelope = RequestEnvelope::stamp(command, CorrelationId::new());
        let correlation_id = envelope.correlation_id.clone();

        let rx = match self.connection.submit(&envelope, timeout) {
            Submission::Pending(rx) => rx,
            Submission::NotConnected => {
                debug!(kind = %envelope.kind, "No editor connected");
                return ResponseEnvelope::failure(
                    envelope.kind,
                    Some(correlation_id),
                    ErrorBody::not_connected(),
                );
            }
            Submission::Rejected(error) => {
                return ResponseEnvelope::failure(envelope.kind, Some(correlation_id), error);
            }
        };

        match rx.await {
            Ok(response) => {
                debug!(
                    correlation_id = %correlation_id,
                    kind = %envelope.kind,
                    success = response.success,
                    "Command resolved"
                );
                response
            }
            Err(_) => {
                error!(
                    correlation_id = %correlation_id,
                    kind = %envelope.kind,
                    "Pending entry dropped without a response"
                );
                ResponseEnvelope::failure(
                    envelope.kind,
                    Some(correlation_id),
                    ErrorBody::internal("response channel closed"),
                )
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }
}
