//! In-process broker.
//!
//! [`MemoryBroker`] fans published messages out over a
//! [`tokio::sync::broadcast`] channel; each [`MemoryTransport`] filters them
//! against its own subscriptions, the way a real broker would. Useful for
//! tests and for driving a device tree without a network.
//!
//! ```rust,ignore
//! let broker = MemoryBroker::new();
//! let mut transport = broker.transport("fractal");
//! transport.connect("localhost", 1883).await?;
//! transport.subscribe("dev/request/#").await?;
//! broker.publish("dev/request", r#"{"describe": null}"#);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use crate::error::Error;
use crate::topic;
use crate::transport::{InboundMessage, Transport, TransportEvent};

const BROKER_CHANNEL_CAPACITY: usize = 256;

// ── MemoryBroker ─────────────────────────────────────────────────────

/// Publishing side of the in-process broker. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    tx: broadcast::Sender<Arc<InboundMessage>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROKER_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish a message to every connected transport.
    ///
    /// Returns the number of transports it was handed to (before their
    /// subscription filters are applied).
    pub fn publish(&self, topic: impl Into<String>, payload: impl Into<Bytes>) -> usize {
        let message = Arc::new(InboundMessage::new(topic, payload));
        tracing::trace!(topic = %message.topic, "memory broker publish");
        self.tx.send(message).unwrap_or(0)
    }

    /// Number of transports currently connected.
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Create a client transport attached to this broker.
    pub fn transport(&self, client_id: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            client_id: client_id.into(),
            broker: Some(self.clone()),
            rx: None,
            subscriptions: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

// ── MemoryTransport ──────────────────────────────────────────────────

/// Client side of the in-process broker.
///
/// Once connected, the transport holds only a receiver: dropping every
/// [`MemoryBroker`] handle ends the event stream with `Disconnected`.
#[derive(Debug)]
pub struct MemoryTransport {
    client_id: String,
    broker: Option<MemoryBroker>,
    rx: Option<broadcast::Receiver<Arc<InboundMessage>>>,
    subscriptions: Vec<String>,
    pending: VecDeque<TransportEvent>,
    finished: bool,
}

impl MemoryTransport {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Filters subscribed so far, in subscription order.
    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions
            .iter()
            .any(|filter| topic::matches(filter, topic))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), Error> {
        let broker = self.broker.take().ok_or_else(|| {
            Error::Connect(format!("client '{}' is already connected", self.client_id))
        })?;

        tracing::info!(client_id = %self.client_id, host, port, "memory transport connected");
        self.rx = Some(broker.tx.subscribe());
        self.pending.push_back(TransportEvent::Connected);
        Ok(())
    }

    async fn subscribe(&mut self, pattern: &str) -> Result<(), Error> {
        if self.rx.is_none() {
            return Err(Error::NotConnected);
        }
        if !self.subscriptions.iter().any(|s| s == pattern) {
            tracing::debug!(client_id = %self.client_id, pattern, "subscribed");
            self.subscriptions.push(pattern.to_string());
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        if self.finished {
            return None;
        }

        loop {
            let rx = self.rx.as_mut()?;
            match rx.recv().await {
                Ok(message) => {
                    if self.is_subscribed(&message.topic) {
                        return Some(TransportEvent::Message((*message).clone()));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        client_id = %self.client_id,
                        skipped,
                        "memory transport lagged, messages dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.finished = true;
                    self.rx = None;
                    return Some(TransportEvent::Disconnected);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_queues_connected_event() {
        let broker = MemoryBroker::new();
        let mut transport = broker.transport("node");

        assert_eq!(broker.client_count(), 0);
        transport.connect("localhost", 1883).await.unwrap();
        assert_eq!(broker.client_count(), 1);
        assert_eq!(transport.next_event().await, Some(TransportEvent::Connected));
    }

    #[tokio::test]
    async fn subscribe_requires_connection() {
        let broker = MemoryBroker::new();
        let mut transport = broker.transport("node");

        let err = transport.subscribe("dev/#").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn second_connect_fails() {
        let broker = MemoryBroker::new();
        let mut transport = broker.transport("node");

        transport.connect("localhost", 1883).await.unwrap();
        let err = transport.connect("localhost", 1883).await.unwrap_err();
        assert!(matches!(err, Error::Connect(_)));
    }

    #[tokio::test]
    async fn delivers_only_subscribed_topics() {
        let broker = MemoryBroker::new();
        let mut transport = broker.transport("node");
        transport.connect("localhost", 1883).await.unwrap();
        transport.subscribe("dev/request/#").await.unwrap();
        transport.subscribe("dev/request/#").await.unwrap();
        assert_eq!(transport.subscriptions(), ["dev/request/#".to_string()]);

        broker.publish("other/topic", "{}");
        broker.publish("dev/request/d1", "{\"get\": \"enabled\"}");

        assert_eq!(transport.next_event().await, Some(TransportEvent::Connected));
        assert_eq!(
            transport.next_event().await,
            Some(TransportEvent::Message(InboundMessage::new(
                "dev/request/d1",
                "{\"get\": \"enabled\"}"
            )))
        );
    }

    #[tokio::test]
    async fn dropping_broker_ends_stream() {
        let broker = MemoryBroker::new();
        let mut transport = broker.transport("node");
        transport.connect("localhost", 1883).await.unwrap();
        drop(broker);

        assert_eq!(transport.next_event().await, Some(TransportEvent::Connected));
        assert_eq!(transport.next_event().await, Some(TransportEvent::Disconnected));
        assert_eq!(transport.next_event().await, None);
    }
}
