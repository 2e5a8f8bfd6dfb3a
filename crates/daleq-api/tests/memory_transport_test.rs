// End-to-end tests for the in-process broker: topic scheme, subscription
// filtering and payload decoding working together.
#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;
use serde_json::json;

use daleq_api::{MemoryBroker, TopicScheme, Transport, TransportEvent, decode_payload};

// ── Helpers ─────────────────────────────────────────────────────────

async fn subscribed_transport(broker: &MemoryBroker, scheme: &TopicScheme) -> daleq_api::MemoryTransport {
    let mut transport = broker.transport("fractal");
    transport.connect("localhost", 1883).await.unwrap();
    assert_eq!(transport.next_event().await, Some(TransportEvent::Connected));
    transport.subscribe(&scheme.request_filter()).await.unwrap();
    transport.subscribe(&scheme.update_filter()).await.unwrap();
    transport
}

async fn next_message(transport: &mut daleq_api::MemoryTransport) -> daleq_api::InboundMessage {
    match transport.next_event().await {
        Some(TransportEvent::Message(message)) => message,
        other => panic!("expected a message, got {other:?}"),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn request_and_update_topics_are_delivered() {
    let broker = MemoryBroker::new();
    let scheme = TopicScheme::default();
    let mut transport = subscribed_transport(&broker, &scheme).await;

    broker.publish(scheme.make_topic(&["request", "fractal"]), r#"{"describe": null}"#);
    broker.publish(scheme.make_topic(&["update", "fractal"]), r#"{"enabled": false}"#);
    broker.publish("elsewhere/request/fractal", "{}");

    let request = next_message(&mut transport).await;
    assert_eq!(request.topic, "dev/request/fractal");
    assert_eq!(scheme.request_path(&request.topic), Some(vec!["fractal".to_string()]));
    assert_eq!(decode_payload(&request.payload).unwrap(), json!({"describe": null}));

    let update = next_message(&mut transport).await;
    assert_eq!(update.topic, "dev/update/fractal");
    assert_eq!(scheme.request_path(&update.topic), None);
}

#[tokio::test]
async fn padded_payload_survives_transport() {
    let broker = MemoryBroker::new();
    let scheme = TopicScheme::default();
    let mut transport = subscribed_transport(&broker, &scheme).await;

    broker.publish("dev/request", b"{\"get\": \"enabled\"}\0\0\0".to_vec());

    let message = next_message(&mut transport).await;
    assert_eq!(decode_payload(&message.payload).unwrap(), json!({"get": "enabled"}));
}

#[tokio::test]
async fn each_transport_filters_independently() {
    let broker = MemoryBroker::new();

    let mut requests = broker.transport("a");
    requests.connect("localhost", 1883).await.unwrap();
    requests.subscribe("dev/request/#").await.unwrap();

    let mut updates = broker.transport("b");
    updates.connect("localhost", 1883).await.unwrap();
    updates.subscribe("dev/update/+").await.unwrap();

    assert_eq!(broker.publish("dev/update/d1", "1"), 2);
    assert_eq!(broker.publish("dev/request/d1", "2"), 2);
    drop(broker);

    assert_eq!(requests.next_event().await, Some(TransportEvent::Connected));
    assert_eq!(next_message(&mut requests).await.topic, "dev/request/d1");
    assert_eq!(requests.next_event().await, Some(TransportEvent::Disconnected));

    assert_eq!(updates.next_event().await, Some(TransportEvent::Connected));
    assert_eq!(next_message(&mut updates).await.topic, "dev/update/d1");
    assert_eq!(updates.next_event().await, Some(TransportEvent::Disconnected));
}
