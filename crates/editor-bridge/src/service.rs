//! Editor bridge service - wires the components together.

use crate::domain::config::BridgeConfig;
use crate::domain::error::BridgeError;
use crate::domain::messages::EventEnvelope;
use crate::domain::pending::PendingRequestTable;
use crate::gateway::CommandGateway;
use crate::ws::connection::{BridgeStatus, ConnectionManager};
use crate::ws::dispatcher::Dispatcher;
use crate::ws::subscriptions::{EventSubscribers, EventSubscription, SubscriberError};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Editor bridge service
pub struct EditorBridge {
    config: BridgeConfig,
    connection: Arc<ConnectionManager>,
    subscribers: Arc<EventSubscribers>,
    pending: Arc<PendingRequestTable>,
    gateway: CommandGateway,
}

impl EditorBridge {
    /// Create a new bridge. Nothing is bound until [`start`](Self::start).
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        config.validate()?;

        let pending = Arc::new(PendingRequestTable::new());
        let subscribers = Arc::new(EventSubscribers::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&pending),
            Arc::clone(&subscribers),
        ));
        let connection = Arc::new(ConnectionManager::new(
            config.clone(),
            Arc::clone(&pending),
            dispatcher,
        ));
        let gateway = CommandGateway::new(Arc::clone(&connection), config.request_timeout);

        Ok(Self {
            config,
            connection,
            subscribers,
            pending,
            gateway,
        })
    }

    /// Start listening on the configured port.
    pub async fn start(&self) -> Result<SocketAddr, BridgeError> {
        self.start_on(self.config.port).await
    }

    /// Start listening on an explicit port (0 picks a free one).
    pub async fn start_on(&self, port: u16) -> Result<SocketAddr, BridgeError> {
        info!(
            host = %self.config.host,
            port = port,
            request_timeout_ms = self.config.request_timeout.as_millis() as u64,
            ping_interval_ms = self.config.ping_interval.as_millis() as u64,
            "Starting editor bridge"
        );
        self.connection.start(port).await
    }

    /// Close the editor connection and the listener. Idempotent.
    pub async fn stop(&self) {
        self.connection.stop().await;
    }

    pub fn gateway(&self) -> CommandGateway {
        self.gateway.clone()
    }

    /// Register an event callback. Drop the handle to unsubscribe.
    pub fn subscribe_events<F>(&self, callback: F) -> EventSubscription
    where
        F: Fn(&EventEnvelope) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.subscribers.subscribe(callback)
    }

    pub fn status(&self) -> BridgeStatus {
        self.connection.status()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.connection.local_addr()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.pending_count()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}
