// daleq-api: publish/subscribe transport layer for daleq device trees

pub mod error;
pub mod memory;
pub mod mqtt;
pub mod payload;
pub mod topic;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use memory::{MemoryBroker, MemoryTransport};
pub use mqtt::MqttTransport;
pub use payload::decode_payload;
pub use topic::TopicScheme;
pub use transport::{InboundMessage, ReconnectConfig, RetryState, Transport, TransportEvent};
pub use websocket::WebSocketTransport;
