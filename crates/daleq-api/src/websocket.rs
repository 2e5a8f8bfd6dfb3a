//! WebSocket bridge transport with auto-reconnect.
//!
//! Talks to a broker bridge over a plain WebSocket. The bridge protocol is
//! JSON text frames in both directions:
//!
//! - outbound subscribe: `{"subscribe": "dev/request/#"}`
//! - inbound message:    `{"topic": "dev/request/d1", "payload": "{\"get\":\"enabled\"}"}`
//!
//! A non-string `payload` is forwarded as its JSON text. A background task
//! owns the socket and reconnects with exponential backoff + jitter; every
//! successful (re)connect surfaces a [`TransportEvent::Connected`] so the
//! router renews its subscriptions.
//!
//! # Example
//!
//! ```rust,ignore
//! use daleq_api::{ReconnectConfig, Transport, WebSocketTransport};
//! use tokio_util::sync::CancellationToken;
//!
//! let mut transport = WebSocketTransport::new("fractal", ReconnectConfig::default(), CancellationToken::new());
//! transport.connect("10.13.37.2", 1883).await?;
//! while let Some(event) = transport.next_event().await {
//!     println!("{event:?}");
//! }
//! ```

use std::time::Instant;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::transport::{InboundMessage, ReconnectConfig, RetryState, Transport, TransportEvent};

// ── Channel capacities ───────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const COMMAND_CHANNEL_CAPACITY: usize = 64;

// ── Bridge frames ────────────────────────────────────────────────────

/// Frame sent to the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum OutboundFrame {
    Subscribe(String),
}

/// Frame received from the bridge.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    topic: String,
    #[serde(default)]
    payload: serde_json::Value,
}

// ── WebSocketTransport ───────────────────────────────────────────────

/// Transport backed by a reconnecting WebSocket connection.
pub struct WebSocketTransport {
    client_id: String,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    event_rx: Option<mpsc::Receiver<TransportEvent>>,
    command_tx: Option<mpsc::Sender<OutboundFrame>>,
}

impl WebSocketTransport {
    pub fn new(
        client_id: impl Into<String>,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            reconnect,
            cancel,
            event_rx: None,
            command_tx: None,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

/// Bridge URL for a broker host and port.
pub fn bridge_url(host: &str, port: u16) -> Result<Url, Error> {
    let url = Url::parse(&format!("ws://{host}:{port}/"))?;
    Ok(url)
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), Error> {
        if self.event_rx.is_some() {
            return Err(Error::Connect(format!(
                "client '{}' is already connected",
                self.client_id
            )));
        }

        let url = bridge_url(host, port)?;
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let reconnect = self.reconnect.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            ws_loop(url, event_tx, command_rx, reconnect, cancel).await;
        });

        self.event_rx = Some(event_rx);
        self.command_tx = Some(command_tx);
        Ok(())
    }

    async fn subscribe(&mut self, pattern: &str) -> Result<(), Error> {
        let command_tx = self.command_tx.as_ref().ok_or(Error::NotConnected)?;
        command_tx
            .send(OutboundFrame::Subscribe(pattern.to_string()))
            .await
            .map_err(|_| Error::Subscribe {
                pattern: pattern.to_string(),
                reason: "connection task has stopped".into(),
            })
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.event_rx.as_mut()?.recv().await
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → pump frames → backoff → reconnect.
///
/// Every lost connection, clean or not, waits out the backoff and spends
/// one attempt from the retry budget.
async fn ws_loop(
    url: Url,
    event_tx: mpsc::Sender<TransportEvent>,
    mut command_rx: mpsc::Receiver<OutboundFrame>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut retry = RetryState::new(reconnect);

    loop {
        let mut connected_at = None;
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_pump(&url, &event_tx, &mut command_rx, &cancel, &mut connected_at, &mut retry) => result,
        };

        if let Some(since) = connected_at {
            retry.connection_ended(since.elapsed());
            if event_tx.send(TransportEvent::Disconnected).await.is_err() {
                // Receiver gone: nobody is listening any more.
                break;
            }
        }
        if cancel.is_cancelled() {
            break;
        }

        match result {
            Ok(()) => tracing::info!(attempt = retry.attempt(), "bridge disconnected cleanly"),
            Err(e) => tracing::warn!(error = %e, attempt = retry.attempt(), "bridge connection error"),
        }

        let Some(delay) = retry.next_delay() else {
            tracing::error!(
                max_retries = ?retry.max_retries(),
                "bridge reconnection limit reached, giving up"
            );
            break;
        };
        tracing::info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt = retry.attempt(),
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    tracing::debug!("bridge loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one connection and pump frames until it drops.
///
/// Sets `connected_at` once the handshake succeeds and marks `retry`
/// healthy for every delivered message.
async fn connect_and_pump(
    url: &Url,
    event_tx: &mpsc::Sender<TransportEvent>,
    command_rx: &mut mpsc::Receiver<OutboundFrame>,
    cancel: &CancellationToken,
    connected_at: &mut Option<Instant>,
    retry: &mut RetryState,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting to bridge");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::Connect(e.to_string()))?;

    tracing::info!("bridge connected");
    *connected_at = Some(Instant::now());
    if event_tx.send(TransportEvent::Connected).await.is_err() {
        return Ok(());
    }

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.close().await;
                return Ok(());
            }
            command = command_rx.recv() => {
                let Some(frame) = command else {
                    // Transport handle dropped.
                    let _ = write.close().await;
                    return Ok(());
                };
                let text = serde_json::to_string(&frame)?;
                write
                    .send(tungstenite::Message::text(text))
                    .await
                    .map_err(|e| Error::Connect(e.to_string()))?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if let Some(message) = parse_frame(&text) {
                            retry.delivered();
                            if event_tx.send(TransportEvent::Message(message)).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        return match frame {
                            Some(cf) => Err(Error::Closed {
                                code: u16::from(cf.code),
                                reason: cf.reason.to_string(),
                            }),
                            None => Ok(()),
                        };
                    }
                    Some(Err(e)) => return Err(Error::Connect(e.to_string())),
                    None => {
                        tracing::info!("bridge stream ended");
                        return Ok(());
                    }
                    _ => {
                        // Binary, Ping, Pong, Frame: tungstenite answers pings itself
                    }
                }
            }
        }
    }
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Parse a bridge text frame into an inbound message.
///
/// Malformed frames are logged and dropped.
fn parse_frame(text: &str) -> Option<InboundMessage> {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse bridge frame");
            return None;
        }
    };

    let payload = match frame.payload {
        serde_json::Value::String(s) => s.into_bytes(),
        other => other.to_string().into_bytes(),
    };
    Some(InboundMessage::new(frame.topic, payload))
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::net::TcpListener;
    use tungstenite::protocol::CloseFrame;
    use tungstenite::protocol::frame::coding::CloseCode;

    use super::*;

    /// Bridge that accepts every connection, optionally sends one message,
    /// then closes with `close`. Returns its port and a connection counter.
    async fn flaky_bridge(greeting: Option<&'static str>, close: Option<CloseFrame>) -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&connections);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let close = close.clone();
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    if let Some(text) = greeting {
                        let _ = ws.send(tungstenite::Message::text(text)).await;
                    }
                    let _ = ws.close(close).await;
                    while let Some(Ok(_)) = ws.next().await {}
                });
            }
        });

        (port, connections)
    }

    fn tight_budget(max_retries: u32) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
            max_retries: Some(max_retries),
        }
    }

    /// Drain events until the transport finishes, counting `Connected`.
    async fn connects_until_closed(transport: &mut WebSocketTransport) -> usize {
        let mut connects = 0;
        tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(event) = transport.next_event().await {
                if event == TransportEvent::Connected {
                    connects += 1;
                }
            }
        })
        .await
        .expect("transport should give up within its retry budget");
        connects
    }

    async fn assert_budget_spent_on(close: Option<CloseFrame>) {
        let (port, connections) = flaky_bridge(None, close).await;
        let mut transport =
            WebSocketTransport::new("node", tight_budget(2), CancellationToken::new());
        transport.connect("127.0.0.1", port).await.unwrap();

        let connects = connects_until_closed(&mut transport).await;
        assert_eq!(connects, 3, "one connection plus two retries");
        assert_eq!(connections.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn clean_close_spends_retry_budget() {
        assert_budget_spent_on(None).await;
    }

    #[tokio::test]
    async fn close_with_code_spends_retry_budget() {
        assert_budget_spent_on(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "going away".into(),
        }))
        .await;
    }

    #[tokio::test]
    async fn delivered_message_refunds_retry_budget() {
        let frame = r#"{"topic": "dev/request", "payload": {"get": "enabled"}}"#;
        let (port, _) = flaky_bridge(Some(frame), None).await;
        let cancel = CancellationToken::new();
        let mut transport = WebSocketTransport::new("node", tight_budget(1), cancel.clone());
        transport.connect("127.0.0.1", port).await.unwrap();

        let mut messages = 0;
        tokio::time::timeout(Duration::from_secs(10), async {
            while let Some(event) = transport.next_event().await {
                if matches!(event, TransportEvent::Message(_)) {
                    messages += 1;
                    if messages == 4 {
                        break;
                    }
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(messages, 4, "budget of one retry outlived by healthy connections");
        cancel.cancel();
    }

    #[test]
    fn bridge_url_from_host_and_port() {
        let url = bridge_url("10.13.37.2", 1883).unwrap();
        assert_eq!(url.as_str(), "ws://10.13.37.2:1883/");
    }

    #[test]
    fn subscribe_frame_shape() {
        let text = serde_json::to_string(&OutboundFrame::Subscribe("dev/request/#".into())).unwrap();
        assert_eq!(text, r#"{"subscribe":"dev/request/#"}"#);
    }

    #[test]
    fn parse_string_payload() {
        let message = parse_frame(r#"{"topic": "dev/request/d1", "payload": "{\"get\":\"enabled\"}"}"#)
            .unwrap();
        assert_eq!(message.topic, "dev/request/d1");
        assert_eq!(&message.payload[..], br#"{"get":"enabled"}"#);
    }

    #[test]
    fn parse_structured_payload() {
        let message = parse_frame(r#"{"topic": "dev/request", "payload": {"describe": null}}"#).unwrap();
        assert_eq!(&message.payload[..], br#"{"describe":null}"#);
    }

    #[test]
    fn parse_malformed_frame() {
        assert!(parse_frame("not json at all").is_none());
        assert!(parse_frame(r#"{"payload": "x"}"#).is_none());
    }

    #[tokio::test]
    async fn subscribe_before_connect_fails() {
        let mut transport =
            WebSocketTransport::new("node", ReconnectConfig::default(), CancellationToken::new());
        let err = transport.subscribe("dev/#").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
        assert!(transport.next_event().await.is_none());
    }
}
