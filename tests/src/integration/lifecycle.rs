//! # Connection Lifecycle
//!
//! Not connected → connected → disconnected, the single-editor policy,
//! graceful stop, and startup failures.

#[cfg(test)]
mod tests {
    use crate::integration::support::{
        http_get, start_bridge, test_config, wait_for, MockEditor, STEP,
    };
    use editor_bridge::{BridgeError, CommandRequest, ConnectionStatus, EditorBridge, ErrorCode};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_send_without_editor_fails_immediately() {
        let (bridge, _addr) = start_bridge(test_config()).await;

        let response = timeout(
            Duration::from_millis(500),
            bridge.gateway().send(CommandRequest::new("get_scene")),
        )
        .await
        .expect("no waiting when nobody is connected");

        assert!(!response.success);
        assert_eq!(response.error_code(), Some(&ErrorCode::NotConnected));
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["success"], false);
        assert_eq!(wire["error"]["code"], "NOT_CONNECTED");
        assert_eq!(bridge.status().stats.registered, 0);

        bridge.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_disconnect_fails_outstanding_requests_before_timeout() {
        const OUTSTANDING: usize = 3;

        let config = editor_bridge::BridgeConfig {
            request_timeout: Duration::from_secs(30),
            ..test_config()
        };
        let (bridge, addr) = start_bridge(config).await;
        let mut editor = MockEditor::attach(&bridge, addr).await;

        let gateway = bridge.gateway();
        let calls: Vec<_> = (0..OUTSTANDING)
            .map(|i| {
                let gateway = gateway.clone();
                tokio::spawn(async move {
                    gateway
                        .send(CommandRequest::new("export_png").with_field("page", i))
                        .await
                })
            })
            .collect();

        for _ in 0..OUTSTANDING {
            editor.recv_json().await;
        }
        assert_eq!(bridge.pending_count(), OUTSTANDING);
        editor.close().await;

        for call in calls {
            let response = timeout(STEP, call).await.expect("swept, not timed out").unwrap();
            assert!(!response.success);
            assert_eq!(response.error_code(), Some(&ErrorCode::NotConnected));
        }

        wait_for(|| !bridge.is_connected()).await;
        assert_eq!(bridge.pending_count(), 0);
        assert_eq!(bridge.status().stats.swept, OUTSTANDING as u64);
        assert_eq!(bridge.status().stats.timeouts, 0);

        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_second_editor_is_rejected_with_policy_close() {
        let (bridge, addr) = start_bridge(test_config()).await;
        let mut first = MockEditor::attach(&bridge, addr).await;
        let first_peer = bridge.status().peer.expect("first editor attached");

        let mut second = MockEditor::connect(addr).await;
        assert_eq!(second.expect_close().await, 1008);

        // The first editor is untouched.
        assert_eq!(bridge.status().peer, Some(first_peer));
        let editor_task = tokio::spawn(async move {
            let request = first.recv_json().await;
            first.reply(&request, "pong", json!({})).await;
            first
        });
        let response = timeout(STEP, bridge.gateway().send(CommandRequest::new("ping")))
            .await
            .expect("first editor still answers");
        assert!(response.success);
        let _first = editor_task.await.unwrap();

        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_editor_can_reconnect_after_disconnect() {
        let (bridge, addr) = start_bridge(test_config()).await;

        let first = MockEditor::attach(&bridge, addr).await;
        let first_id = bridge.status().peer.unwrap().connection_id;
        first.close().await;
        wait_for(|| !bridge.is_connected()).await;
        assert_eq!(bridge.status().status, ConnectionStatus::Disconnected);

        let mut second = MockEditor::attach(&bridge, addr).await;
        assert!(bridge.status().peer.unwrap().connection_id > first_id);

        let editor_task = tokio::spawn(async move {
            let request = second.recv_json().await;
            second.reply(&request, "scene", json!({ "elements": [] })).await;
            second
        });
        let response = timeout(STEP, bridge.gateway().send(CommandRequest::new("get_scene")))
            .await
            .unwrap();
        assert!(response.success);
        let _second = editor_task.await.unwrap();

        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_editor_normally_and_is_idempotent() {
        let (bridge, addr) = start_bridge(test_config()).await;
        let mut editor = MockEditor::attach(&bridge, addr).await;

        bridge.stop().await;
        assert_eq!(editor.expect_close().await, 1000);
        assert!(!bridge.is_connected());
        assert!(bridge.local_addr().is_none());

        bridge.stop().await;

        let response = bridge.gateway().send(CommandRequest::new("get_scene")).await;
        assert_eq!(response.error_code(), Some(&ErrorCode::NotConnected));
    }

    #[tokio::test]
    async fn test_stop_fails_in_flight_requests() {
        let (bridge, addr) = start_bridge(test_config()).await;
        let mut editor = MockEditor::attach(&bridge, addr).await;

        let gateway = bridge.gateway();
        let call = tokio::spawn(async move { gateway.send(CommandRequest::new("get_scene")).await });
        editor.recv_json().await;

        bridge.stop().await;
        let response = timeout(STEP, call).await.unwrap().unwrap();
        assert_eq!(response.error_code(), Some(&ErrorCode::NotConnected));
        assert_eq!(bridge.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_bridge_restarts_after_stop() {
        let (bridge, _) = start_bridge(test_config()).await;
        bridge.stop().await;

        let addr = bridge.start_on(0).await.expect("restart after stop");
        assert_eq!(bridge.local_addr(), Some(addr));
        let _editor = MockEditor::attach(&bridge, addr).await;

        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_occupied_port_fails_to_start() {
        let (holder, addr) = start_bridge(test_config()).await;

        let contender = EditorBridge::new(test_config()).unwrap();
        match contender.start_on(addr.port()).await {
            Err(BridgeError::Bind { addr: failed, .. }) => assert_eq!(failed.port(), addr.port()),
            other => panic!("expected bind failure, got {:?}", other),
        }

        holder.stop().await;
    }

    #[tokio::test]
    async fn test_health_reports_connection_state() {
        let (bridge, addr) = start_bridge(test_config()).await;

        let response = http_get(addr, "/health").await;
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
        assert!(response.contains(r#""status":"disconnected""#), "{}", response);

        let _editor = MockEditor::attach(&bridge, addr).await;
        let response = http_get(addr, "/health").await;
        assert!(response.contains(r#""status":"connected""#), "{}", response);
        assert!(response.contains(r#""connection_id":1"#), "{}", response);

        bridge.stop().await;
    }
}
