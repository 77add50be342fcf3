//! Fixtures: a running bridge and a scripted editor peer.

use editor_bridge::{BridgeConfig, EditorBridge};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Upper bound for any single step of a scenario.
pub const STEP: Duration = Duration::from_secs(5);

/// Config tuned for tests: quick timeouts, pings out of the way.
pub fn test_config() -> BridgeConfig {
    BridgeConfig {
        request_timeout: Duration::from_secs(5),
        ping_interval: Duration::from_secs(30),
        shutdown_grace: Duration::from_secs(2),
        ..Default::default()
    }
}

/// Start a bridge on an ephemeral port.
pub async fn start_bridge(config: BridgeConfig) -> (EditorBridge, SocketAddr) {
    let bridge = EditorBridge::new(config).expect("valid test config");
    let addr = bridge.start_on(0).await.expect("bridge starts");
    (bridge, addr)
}

/// Poll until `condition` holds, failing the test after [`STEP`].
pub async fn wait_for<F: Fn() -> bool>(condition: F) {
    timeout(STEP, async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Plain HTTP GET against the bridge listener. Returns the raw response.
pub async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.expect("tcp connect");
    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
        path, addr
    );
    stream.write_all(request.as_bytes()).await.expect("write request");

    let mut response = Vec::new();
    timeout(STEP, stream.read_to_end(&mut response))
        .await
        .expect("http response in time")
        .expect("read response");
    String::from_utf8(response).expect("utf-8 response")
}

/// A scripted editor connected to the bridge.
pub struct MockEditor {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl MockEditor {
    /// Open the socket. The bridge may not have attached it yet.
    pub async fn connect(addr: SocketAddr) -> Self {
        let (socket, _) = connect_async(format!("ws://{}/", addr))
            .await
            .expect("editor connects");
        Self { socket }
    }

    /// Connect and wait until the bridge reports the editor as attached.
    pub async fn attach(bridge: &EditorBridge, addr: SocketAddr) -> Self {
        let editor = Self::connect(addr).await;
        wait_for(|| bridge.is_connected()).await;
        editor
    }

    pub async fn send_json(&mut self, value: &Value) {
        self.send_raw(Message::text(value.to_string())).await;
    }

    pub async fn send_raw(&mut self, message: Message) {
        self.socket.send(message).await.expect("editor send");
    }

    /// Next JSON frame from the bridge, skipping control frames.
    pub async fn recv_json(&mut self) -> Value {
        loop {
            let frame = timeout(STEP, self.socket.next())
                .await
                .expect("frame from bridge in time")
                .expect("socket still open")
                .expect("socket healthy");
            match frame {
                Message::Text(text) => {
                    return serde_json::from_str(text.as_str()).expect("bridge sent JSON")
                }
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected frame from bridge: {:?}", other),
            }
        }
    }

    /// Reply successfully to `request`, echoing its correlation ID.
    pub async fn reply(&mut self, request: &Value, kind: &str, data: Value) {
        self.send_json(&json!({
            "type": kind,
            "correlationId": request["correlationId"],
            "success": true,
            "data": data,
        }))
        .await;
    }

    /// Reply with an editor-side failure.
    pub async fn reply_error(&mut self, request: &Value, code: &str, message: &str) {
        self.send_json(&json!({
            "type": "error",
            "correlationId": request["correlationId"],
            "success": false,
            "error": { "code": code, "message": message },
        }))
        .await;
    }

    /// Read until the bridge closes the socket; returns the close code.
    pub async fn expect_close(&mut self) -> u16 {
        loop {
            let frame = timeout(STEP, self.socket.next())
                .await
                .expect("close from bridge in time");
            match frame {
                Some(Ok(Message::Close(Some(close)))) => return u16::from(close.code),
                Some(Ok(Message::Close(None))) => panic!("close frame without a code"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => panic!("socket error before close frame: {}", e),
                None => panic!("socket ended without a close frame"),
            }
        }
    }

    /// Graceful close from the editor side.
    pub async fn close(mut self) {
        let _ = self.socket.close(None).await;
    }
}
