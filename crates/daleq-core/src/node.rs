// ── Node: tree root bound to a transport ──
//
// The node is the root bus of a device tree. It subscribes to the request
// and update channels of its topic scheme, turns request topics into
// dispatch targets, and runs messages through the tree one at a time.

use daleq_api::{InboundMessage, TopicScheme, Transport, TransportEvent, decode_payload};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::Bus;
use crate::device::{Device, DeviceCore};
use crate::error::CoreError;

pub const NODE_TYPE: &str = "node";

/// Where the node's transport connects, and under which topic root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSettings {
    pub host: String,
    pub port: u16,
    pub topics: TopicScheme,
}

impl NodeSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            topics: TopicScheme::default(),
        }
    }

    #[must_use]
    pub fn with_topics(mut self, topics: TopicScheme) -> Self {
        self.topics = topics;
        self
    }
}

/// Root of a device tree, serving requests from a [`Transport`].
pub struct Node<T: Transport> {
    root: Bus,
    transport: T,
    settings: NodeSettings,
}

impl<T: Transport> Node<T> {
    pub fn new(id: impl Into<String>, transport: T, settings: NodeSettings) -> Self {
        Self::with_core(DeviceCore::new(id), transport, settings)
    }

    pub fn with_core(core: DeviceCore, transport: T, settings: NodeSettings) -> Self {
        Self {
            root: Bus::with_core(core).with_kind(NODE_TYPE),
            transport,
            settings,
        }
    }

    pub fn id(&self) -> &str {
        self.root.id()
    }

    pub fn root(&self) -> &Bus {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Bus {
        &mut self.root
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn add(&mut self, device: Box<dyn Device>) -> Result<(), CoreError> {
        self.root.add(device)
    }

    /// Run every device's setup hook.
    pub fn setup(&mut self) -> Result<(), CoreError> {
        self.root.setup()
    }

    /// Dispatch a message through the tree.
    pub fn handle(&mut self, target: &[String], message: &Value) -> Option<Value> {
        self.root.handle(target, message)
    }

    /// `<root>/<segments..>`
    pub fn make_topic<S: AsRef<str>>(&self, segments: &[S]) -> String {
        self.settings.topics.make_topic(segments)
    }

    // ── Transport callbacks ──────────────────────────────────────────

    /// Subscribe to the request and update channels.
    pub async fn on_connect(&mut self) -> Result<(), CoreError> {
        for pattern in [
            self.settings.topics.request_filter(),
            self.settings.topics.update_filter(),
        ] {
            self.transport.subscribe(&pattern).await?;
            info!(node = self.root.id(), pattern = %pattern, "subscribed");
        }
        Ok(())
    }

    /// Handle one inbound message and return the tree's answer.
    ///
    /// Messages outside the request channel are ignored; undecodable
    /// payloads are logged and skipped.
    pub fn on_message(&mut self, message: &InboundMessage) -> Option<Value> {
        let Some(target) = self.settings.topics.request_path(&message.topic) else {
            debug!(topic = %message.topic, "ignoring message outside request channel");
            return None;
        };

        let payload = match decode_payload(&message.payload) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "dropping undecodable payload");
                return None;
            }
        };

        let response = self.handle(&target, &payload);
        info!(
            topic = %message.topic,
            response = %response.as_ref().unwrap_or(&serde_json::Value::Null),
            "handled request"
        );
        response
    }

    // ── Event loop ───────────────────────────────────────────────────

    /// Connect and serve until cancelled or the transport closes.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), CoreError> {
        info!(
            node = self.root.id(),
            host = %self.settings.host,
            port = self.settings.port,
            "connecting"
        );
        self.transport
            .connect(&self.settings.host, self.settings.port)
            .await?;

        loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(node = self.root.id(), "shutdown requested");
                    break;
                }
                event = self.transport.next_event() => event,
            };

            match event {
                Some(TransportEvent::Connected) => self.on_connect().await?,
                Some(TransportEvent::Message(message)) => {
                    self.on_message(&message);
                }
                Some(TransportEvent::Disconnected) => {
                    warn!(node = self.root.id(), "transport disconnected");
                }
                None => {
                    info!(node = self.root.id(), "transport closed");
                    break;
                }
            }
        }

        Ok(())
    }
}
