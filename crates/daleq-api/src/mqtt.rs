//! MQTT broker transport.
//!
//! Speaks MQTT 3.1.1 to a broker through `rumqttc`. The `rumqttc` event loop
//! runs on a background task: `ConnAck` surfaces as
//! [`TransportEvent::Connected`], every `Publish` as a
//! [`TransportEvent::Message`], and a connection error as
//! [`TransportEvent::Disconnected`] followed by a backed-off reconnect.
//! Sessions are clean, so subscriptions are lost with the connection and
//! the router renews them on the next `Connected`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::transport::{InboundMessage, ReconnectConfig, RetryState, Transport, TransportEvent};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const REQUEST_CHANNEL_CAPACITY: usize = 64;
const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Transport backed by an MQTT broker connection.
pub struct MqttTransport {
    client_id: String,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
    client: Option<AsyncClient>,
    event_rx: Option<mpsc::Receiver<TransportEvent>>,
}

impl MqttTransport {
    pub fn new(
        client_id: impl Into<String>,
        reconnect: ReconnectConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            reconnect,
            cancel,
            client: None,
            event_rx: None,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), Error> {
        if self.client.is_some() {
            return Err(Error::Connect(format!(
                "client '{}' is already connected",
                self.client_id
            )));
        }

        let mut options = MqttOptions::new(&self.client_id, host, port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let reconnect = self.reconnect.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            mqtt_loop(eventloop, event_tx, reconnect, cancel).await;
        });

        self.client = Some(client);
        self.event_rx = Some(event_rx);
        Ok(())
    }

    async fn subscribe(&mut self, pattern: &str) -> Result<(), Error> {
        let client = self.client.as_ref().ok_or(Error::NotConnected)?;
        client
            .subscribe(pattern, QoS::AtMostOnce)
            .await
            .map_err(|e| Error::Subscribe {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.event_rx.as_mut()?.recv().await
    }
}

// ── Background event loop ────────────────────────────────────────────

/// Poll the broker connection, translating packets into transport events.
///
/// `rumqttc` reconnects on the next `poll` after an error; this loop only
/// decides whether and when that next poll happens.
async fn mqtt_loop(
    mut eventloop: EventLoop,
    event_tx: mpsc::Sender<TransportEvent>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut retry = RetryState::new(reconnect);
    let mut connected_at: Option<Instant> = None;

    loop {
        let polled = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            polled = eventloop.poll() => polled,
        };

        let event = match polled {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                tracing::info!(code = ?ack.code, "broker connected");
                connected_at = Some(Instant::now());
                TransportEvent::Connected
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                retry.delivered();
                TransportEvent::Message(InboundMessage::new(publish.topic, publish.payload))
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, attempt = retry.attempt(), "broker connection error");
                if let Some(since) = connected_at.take() {
                    retry.connection_ended(since.elapsed());
                    if event_tx.send(TransportEvent::Disconnected).await.is_err() {
                        break;
                    }
                }

                let Some(delay) = retry.next_delay() else {
                    tracing::error!(
                        max_retries = ?retry.max_retries(),
                        "broker reconnection limit reached, giving up"
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
                continue;
            }
        };

        if event_tx.send(event).await.is_err() {
            // Receiver gone: nobody is listening any more.
            break;
        }
    }

    tracing::debug!("broker loop exiting");
}
