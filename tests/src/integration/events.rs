//! # Editor Events
//!
//! Frames with neither `correlationId` nor `success` are events and fan out
//! to every subscriber. Bad frames are dropped without touching the
//! connection.

#[cfg(test)]
mod tests {
    use crate::integration::support::{start_bridge, test_config, MockEditor, STEP};
    use editor_bridge::{CommandRequest, EventEnvelope};
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;

    fn collector() -> (
        impl Fn(&EventEnvelope) -> Result<(), editor_bridge::SubscriberError> + Send + Sync + 'static,
        mpsc::UnboundedReceiver<EventEnvelope>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback = move |event: &EventEnvelope| {
            tx.send(event.clone())?;
            Ok(())
        };
        (callback, rx)
    }

    #[tokio::test]
    async fn test_event_reaches_every_subscriber() {
        let (bridge, addr) = start_bridge(test_config()).await;
        let (first_cb, mut first_rx) = collector();
        let (second_cb, mut second_rx) = collector();
        let _first = bridge.subscribe_events(first_cb);
        let _second = bridge.subscribe_events(second_cb);

        let mut editor = MockEditor::attach(&bridge, addr).await;
        editor
            .send_json(&json!({
                "type": "selection_changed",
                "timestamp": "2024-05-01T12:00:00.000Z",
                "data": { "ids": ["el_1"] },
            }))
            .await;

        for rx in [&mut first_rx, &mut second_rx] {
            let event = timeout(STEP, rx.recv()).await.unwrap().unwrap();
            assert_eq!(event.kind, "selection_changed");
            assert_eq!(event.data.unwrap()["ids"], json!(["el_1"]));
        }

        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_failing_subscriber_does_not_starve_others() {
        let (bridge, addr) = start_bridge(test_config()).await;
        let _failing = bridge.subscribe_events(|_| Err("subscriber is broken".into()));
        let (healthy_cb, mut healthy_rx) = collector();
        let _healthy = bridge.subscribe_events(healthy_cb);

        let mut editor = MockEditor::attach(&bridge, addr).await;
        editor
            .send_json(&json!({ "type": "scene_changed", "data": {} }))
            .await;

        let event = timeout(STEP, healthy_rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.kind, "scene_changed");

        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_frames_with_success_are_not_events() {
        let (bridge, addr) = start_bridge(test_config()).await;
        let (cb, mut rx) = collector();
        let _sub = bridge.subscribe_events(cb);

        let mut editor = MockEditor::attach(&bridge, addr).await;
        // A response-shaped frame nobody is waiting for, then a real event.
        editor
            .send_json(&json!({ "type": "stray", "success": true }))
            .await;
        editor
            .send_json(&json!({ "type": "tool_changed", "data": { "tool": "pen" } }))
            .await;

        let event = timeout(STEP, rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.kind, "tool_changed");

        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_frames_keep_the_connection_alive() {
        let (bridge, addr) = start_bridge(test_config()).await;
        let mut editor = MockEditor::attach(&bridge, addr).await;

        editor.send_raw(Message::text("this is not json")).await;
        editor.send_raw(Message::text("[1, 2, 3]")).await;
        editor.send_raw(Message::binary(vec![0xff, 0xfe, 0xfd])).await;

        let editor_task = tokio::spawn(async move {
            let request = editor.recv_json().await;
            editor
                .reply(&request, "element_created", json!({ "elementId": "el_7" }))
                .await;
            editor
        });

        let response = timeout(STEP, bridge.gateway().send(CommandRequest::new("create_text")))
            .await
            .expect("connection survived bad frames");
        assert!(response.success);
        assert!(bridge.is_connected());
        let _editor = editor_task.await.unwrap();

        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_utf8_binary_frames_are_decoded() {
        let (bridge, addr) = start_bridge(test_config()).await;
        let (cb, mut rx) = collector();
        let _sub = bridge.subscribe_events(cb);

        let mut editor = MockEditor::attach(&bridge, addr).await;
        let payload = json!({ "type": "viewport_changed", "data": { "zoom": 2 } }).to_string();
        editor.send_raw(Message::binary(payload.into_bytes())).await;

        let event = timeout(STEP, rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.kind, "viewport_changed");

        bridge.stop().await;
    }
}
