//! Connection manager: the single editor socket.
//!
//! Lifecycle: `start` → listening → editor connects → connected →
//! socket closes / `stop` → disconnected. Only one editor is attached at a
//! time; a second one is closed with 1008 (policy violation) and the first
//! is left alone.
//!
//! Each connection runs a reader loop (inbound frames → [`Dispatcher`]) and
//! a writer task that owns the socket sink, drains the outbound queue and
//! sends liveness pings.
//!
//! Requests are registered in the pending table while holding the same lock
//! the disconnect path uses to clear the peer and sweep. A request is
//! therefore either registered before the disconnect (and swept by it) or
//! sees no peer and fails fast with `NOT_CONNECTED`. A request registered
//! against a later peer is never touched by an earlier peer's sweep.

use crate::domain::config::BridgeConfig;
use crate::domain::correlation::CorrelationId;
use crate::domain::error::{BridgeError, ErrorBody};
use crate::domain::messages::RequestEnvelope;
use crate::domain::pending::{PendingReceiver, PendingRequestTable, PendingStatsSnapshot};
use crate::ws::dispatcher::Dispatcher;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// How long a closing connection waits for its writer to flush.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Missed ping rounds before the editor is considered gone.
const MAX_SILENT_PINGS: u32 = 2;

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
}

/// The attached editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerInfo {
    /// Monotonic per-manager connection counter
    pub connection_id: u64,
    pub addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

/// Bridge status snapshot (served on `/health`)
#[derive(Debug, Clone, Serialize)]
pub struct BridgeStatus {
    pub status: ConnectionStatus,
    pub listening: Option<SocketAddr>,
    pub peer: Option<PeerInfo>,
    pub pending: usize,
    pub stats: PendingStatsSnapshot,
    pub version: &'static str,
}

/// Result of handing a request to the connection.
#[derive(Debug)]
pub enum Submission {
    /// No editor attached. Nothing was registered or written.
    NotConnected,
    /// Registered. The receiver resolves exactly once.
    Pending(PendingReceiver),
    /// Rejected before registration.
    Rejected(ErrorBody),
}

enum Outbound {
    Request {
        correlation_id: CorrelationId,
        kind: String,
        frame: String,
    },
    Close {
        code: u16,
        reason: &'static str,
    },
}

struct ActivePeer {
    info: PeerInfo,
    outbound: mpsc::UnboundedSender<Outbound>,
}

struct RunningListener {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct ConnectionState {
    listener: Option<RunningListener>,
    peer: Option<ActivePeer>,
    next_connection_id: u64,
}

enum Rejection {
    Busy(SocketAddr),
    Stopping,
}

struct Claimed {
    info: PeerInfo,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    shutdown: watch::Receiver<bool>,
}

/// Owns the listener and the single editor connection.
pub struct ConnectionManager {
    config: BridgeConfig,
    pending: Arc<PendingRequestTable>,
    dispatcher: Arc<Dispatcher>,
    state: Mutex<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(
        config: BridgeConfig,
        pending: Arc<PendingRequestTable>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            config,
            pending,
            dispatcher,
            state: Mutex::new(ConnectionState::default()),
        }
    }

    /// Bind the listener and start accepting the editor.
    ///
    /// Resolves once the socket is listening. Port 0 picks a free port; the
    /// bound address is returned.
    pub async fn start(self: &Arc<Self>, port: u16) -> Result<SocketAddr, BridgeError> {
        let addr = self.config.listen_addr(port);
        if let Some(running) = self.local_addr() {
            return Err(BridgeError::AlreadyRunning(running));
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| BridgeError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| BridgeError::Bind { addr, source })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        let mut state = self.state.lock();
        if let Some(running) = &state.listener {
            // Lost a race with a concurrent start; our socket is dropped here.
            return Err(BridgeError::AlreadyRunning(running.local_addr));
        }

        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app)
                .with_graceful_shutdown(wait_for_shutdown(shutdown_rx));
            if let Err(e) = server.await {
                error!(error = %e, "Editor listener failed");
            }
        });

        state.listener = Some(RunningListener {
            local_addr,
            shutdown: shutdown_tx,
            task,
        });
        info!(addr = %local_addr, "Editor bridge listening");
        Ok(local_addr)
    }

    /// Close the editor connection, fail everything in flight with
    /// `NOT_CONNECTED`, and shut the listener down. Idempotent.
    pub async fn stop(&self) {
        let (listener, peer, swept) = {
            let mut state = self.state.lock();
            let listener = state.listener.take();
            let peer = state.peer.take();
            let swept = self.pending.sweep(ErrorBody::not_connected());
            (listener, peer, swept)
        };

        if let Some(peer) = peer {
            info!(
                connection_id = peer.info.connection_id,
                peer = %peer.info.addr,
                "Closing editor connection"
            );
            // The writer sends the close frame, then exits.
            let _ = peer.outbound.send(Outbound::Close {
                code: close_code::NORMAL,
                reason: "bridge shutting down",
            });
        }
        if swept > 0 {
            debug!(swept = swept, "Failed in-flight requests on stop");
        }

        let Some(listener) = listener else {
            debug!("Editor bridge already stopped");
            return;
        };

        let _ = listener.shutdown.send(true);
        let abort = listener.task.abort_handle();
        match tokio::time::timeout(self.config.shutdown_grace, listener.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Editor listener task ended abnormally"),
            Err(_) => {
                warn!(
                    grace_ms = self.config.shutdown_grace.as_millis() as u64,
                    "Editor listener did not drain in time, aborting"
                );
                abort.abort();
            }
        }

        info!(addr = %listener.local_addr, "Editor bridge stopped");
    }

    /// Register a request and queue its frame for the editor.
    pub fn submit(&self, envelope: &RequestEnvelope, timeout: Duration) -> Submission {
        let state = self.state.lock();
        let Some(peer) = state.peer.as_ref() else {
            return Submission::NotConnected;
        };

        let correlation_id = &envelope.correlation_id;
        let rx = match self
            .pending
            .register(correlation_id.clone(), &envelope.kind, timeout)
        {
            Ok(rx) => rx,
            Err(e) => return Submission::Rejected(ErrorBody::internal(e)),
        };

        let frame = match envelope.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                self.fail(
                    correlation_id,
                    &envelope.kind,
                    format!("failed to serialize request: {}", e),
                );
                return Submission::Pending(rx);
            }
        };

        let queued = peer.outbound.send(Outbound::Request {
            correlation_id: correlation_id.clone(),
            kind: envelope.kind.clone(),
            frame,
        });
        if queued.is_err() {
            self.fail(correlation_id, &envelope.kind, "socket writer is closed");
        } else {
            debug!(
                correlation_id = %correlation_id,
                kind = %envelope.kind,
                connection_id = peer.info.connection_id,
                "Queued request for editor"
            );
        }

        Submission::Pending(rx)
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().peer.is_some()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        if self.is_connected() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }

    /// Bound listener address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().listener.as_ref().map(|l| l.local_addr)
    }

    pub fn status(&self) -> BridgeStatus {
        let state = self.state.lock();
        BridgeStatus {
            status: if state.peer.is_some() {
                ConnectionStatus::Connected
            } else {
                ConnectionStatus::Disconnected
            },
            listening: state.listener.as_ref().map(|l| l.local_addr),
            peer: state.peer.as_ref().map(|p| p.info.clone()),
            pending: self.pending.pending_count(),
            stats: self.pending.stats().snapshot(),
            version: crate::VERSION,
        }
    }

    fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/", get(upgrade))
            .route("/health", get(health))
            .with_state(Arc::clone(self))
    }

    fn fail(&self, correlation_id: &CorrelationId, kind: &str, details: impl std::fmt::Display) {
        warn!(correlation_id = %correlation_id, kind = kind, error = %details, "Request write failed");
        self.pending.fail(correlation_id, ErrorBody::internal(details));
    }

    fn claim(&self, addr: SocketAddr) -> Result<Claimed, Rejection> {
        let mut state = self.state.lock();
        let shutdown = match &state.listener {
            Some(listener) => listener.shutdown.subscribe(),
            None => return Err(Rejection::Stopping),
        };
        if let Some(active) = &state.peer {
            return Err(Rejection::Busy(active.info.addr));
        }

        state.next_connection_id += 1;
        let info = PeerInfo {
            connection_id: state.next_connection_id,
            addr,
            connected_at: Utc::now(),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        state.peer = Some(ActivePeer {
            info: info.clone(),
            outbound: tx,
        });

        Ok(Claimed {
            info,
            outbound: rx,
            shutdown,
        })
    }

    /// Mark the connection gone and sweep. No-op if it was already replaced
    /// or cleared by `stop`.
    ///
    /// The sweep runs under the state lock so a peer claimed right after
    /// cannot have its first requests failed by this one.
    fn release(&self, connection_id: u64, reason: &str) {
        let swept = {
            let mut state = self.state.lock();
            let active = state
                .peer
                .as_ref()
                .is_some_and(|p| p.info.connection_id == connection_id);
            if active {
                state.peer = None;
                Some(self.pending.sweep(ErrorBody::not_connected()))
            } else {
                None
            }
        };

        if let Some(swept) = swept {
            info!(
                connection_id = connection_id,
                reason = reason,
                swept = swept,
                "Editor disconnected"
            );
        } else {
            debug!(connection_id = connection_id, reason = reason, "Connection task finished");
        }
    }

    async fn run_peer(self: Arc<Self>, socket: WebSocket, addr: SocketAddr) {
        let Claimed {
            info,
            outbound,
            mut shutdown,
        } = match self.claim(addr) {
            Ok(claimed) => claimed,
            Err(Rejection::Busy(active)) => {
                warn!(
                    peer = %addr,
                    active = %active,
                    "Rejecting second editor connection"
                );
                reject(socket, close_code::POLICY, "another editor is already connected").await;
                return;
            }
            Err(Rejection::Stopping) => {
                reject(socket, close_code::AWAY, "bridge shutting down").await;
                return;
            }
        };

        info!(
            connection_id = info.connection_id,
            peer = %addr,
            "Editor connected"
        );

        let (sink, mut stream) = socket.split();
        let last_seen = Arc::new(Mutex::new(Instant::now()));
        let mut writer = tokio::spawn(write_loop(
            sink,
            outbound,
            Arc::clone(&last_seen),
            self.config.ping_interval,
            Arc::clone(&self.pending),
        ));
        let mut writer_done = false;

        let reason = loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break "bridge stopping";
                    }
                }
                result = &mut writer, if !writer_done => {
                    writer_done = true;
                    break result.unwrap_or("writer task failed");
                }
                frame = stream.next() => {
                    *last_seen.lock() = Instant::now();
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.dispatcher.dispatch(&text);
                        }
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => {
                                self.dispatcher.dispatch(&text);
                            }
                            Err(_) => warn!(connection_id = info.connection_id, "Dropping non-UTF-8 binary frame"),
                        },
                        Some(Ok(Message::Ping(_))) => {
                            // Pong is sent by the WebSocket layer.
                        }
                        Some(Ok(Message::Pong(_))) => {
                            debug!(connection_id = info.connection_id, "Liveness pong");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(connection_id = info.connection_id, frame = ?frame, "Close received");
                            break "closed by editor";
                        }
                        Some(Err(e)) => {
                            warn!(connection_id = info.connection_id, error = %e, "WebSocket error");
                            break "socket error";
                        }
                        None => break "socket closed",
                    }
                }
            }
        };

        self.release(info.connection_id, reason);

        if !writer_done && tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
            writer.abort();
        }
    }
}

/// Writer task: outbound frames, liveness pings, and the silence check.
///
/// Returns why it stopped.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    last_seen: Arc<Mutex<Instant>>,
    ping_interval: Duration,
    pending: Arc<PendingRequestTable>,
) -> &'static str {
    let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let silence_limit = ping_interval * (MAX_SILENT_PINGS + 1);

    loop {
        tokio::select! {
            message = outbound.recv() => match message {
                Some(Outbound::Request { correlation_id, kind, frame }) => {
                    if let Err(e) = sink.send(Message::Text(frame)).await {
                        warn!(correlation_id = %correlation_id, kind = %kind, error = %e, "Socket write failed");
                        pending.fail(
                            &correlation_id,
                            ErrorBody::internal(format!("socket write failed: {}", e)),
                        );
                        return "socket write failed";
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code,
                        reason: Cow::Borrowed(reason),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "Close frame not delivered");
                    }
                    return "closed by bridge";
                }
                None => return "connection released",
            },
            _ = ping.tick() => {
                let silent_for = last_seen.lock().elapsed();
                if silent_for > silence_limit {
                    warn!(
                        silent_ms = silent_for.as_millis() as u64,
                        "Editor stopped answering pings"
                    );
                    return "editor unresponsive";
                }
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    warn!(error = %e, "Liveness ping failed");
                    return "ping failed";
                }
                debug!("Sent liveness ping");
            }
        }
    }
}

async fn reject(mut socket: WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: Cow::Borrowed(reason),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Rejection close frame not delivered");
        return;
    }
    // Give the client a moment to complete the close handshake.
    let _ = tokio::time::timeout(CLOSE_GRACE, async {
        while let Some(Ok(_)) = socket.recv().await {}
    })
    .await;
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

async fn upgrade(
    State(manager): State<Arc<ConnectionManager>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    let limit = manager.config.max_frame_size;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| manager.run_peer(socket, addr))
}

async fn health(State(manager): State<Arc<ConnectionManager>>) -> impl IntoResponse {
    Json(manager.status())
}
