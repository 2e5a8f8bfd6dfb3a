// Transport contract between the device tree and a publish/subscribe broker.
//
// The router only needs three things from a broker client: connect,
// subscribe to a filter, and hand over inbound events one at a time.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Error;

/// A message delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Events surfaced by a transport, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker accepted the connection. Subscriptions must be
    /// (re)issued after every `Connected`.
    Connected,
    /// An inbound message on a subscribed topic.
    Message(InboundMessage),
    /// The connection dropped. A reconnecting transport follows up with
    /// another `Connected`.
    Disconnected,
}

/// Publish/subscribe client used by the router.
#[async_trait]
pub trait Transport: Send {
    /// Open the connection. A `Connected` event is queued on success.
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), Error>;

    /// Subscribe to a topic filter (`+` / `#` wildcards).
    async fn subscribe(&mut self, pattern: &str) -> Result<(), Error>;

    /// Wait for the next event. `None` means the transport is finished
    /// and will never produce another event.
    async fn next_event(&mut self) -> Option<TransportEvent>;
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnecting transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

impl ReconnectConfig {
    /// Exponential backoff with jitter.
    ///
    /// `delay = min(initial * 2^attempt, max) * (1 +- 0.25)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
        let capped = base.min(self.max_delay.as_secs_f64());

        // Deterministic jitter seeded from the attempt number.
        let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();

        Duration::from_secs_f64((capped * jitter_factor).max(0.0))
    }

    /// Whether another attempt is allowed after `attempt` failures.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_retries.is_none_or(|max| attempt < max)
    }
}

// ── RetryState ───────────────────────────────────────────────────────

/// Retry bookkeeping for one reconnecting transport.
///
/// Every lost connection costs one attempt, clean closes included. The
/// counter only resets once a connection proved healthy: it delivered a
/// message, or stayed up for at least `max_delay`. A broker that accepts
/// and immediately drops therefore still exhausts `max_retries`.
#[derive(Debug, Clone)]
pub struct RetryState {
    config: ReconnectConfig,
    attempt: u32,
}

impl RetryState {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Attempts spent since the last healthy connection.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// A message arrived on the current connection.
    pub fn delivered(&mut self) {
        self.attempt = 0;
    }

    /// A connection that had been established ended after `uptime`.
    pub fn connection_ended(&mut self, uptime: Duration) {
        if uptime >= self.config.max_delay {
            self.attempt = 0;
        }
    }

    /// Spend one attempt and return the delay before it, or `None` once
    /// the budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.config.allows(self.attempt) {
            return None;
        }
        let delay = self.config.backoff(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    pub fn max_retries(&self) -> Option<u32> {
        self.config.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_grows_then_caps() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d0 = config.backoff(0);
        let d1 = config.backoff(1);
        let d2 = config.backoff(2);
        assert!(d1 > d0, "d1 ({d1:?}) should exceed d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should exceed d1 ({d1:?})");

        // Jitter is at most +25%.
        let d10 = config.backoff(10);
        assert!(d10 <= Duration::from_millis(12_500), "{d10:?} not capped");
    }

    #[test]
    fn retry_budget() {
        let unlimited = ReconnectConfig::default();
        assert!(unlimited.allows(10_000));

        let limited = ReconnectConfig {
            max_retries: Some(2),
            ..ReconnectConfig::default()
        };
        assert!(limited.allows(0));
        assert!(limited.allows(1));
        assert!(!limited.allows(2));
    }

    #[test]
    fn retry_state_spends_budget_on_every_loss() {
        let mut retry = RetryState::new(ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(5),
            max_retries: Some(2),
        });

        assert!(retry.next_delay().is_some());
        // A short-lived connection does not refund anything.
        retry.connection_ended(Duration::from_millis(50));
        assert!(retry.next_delay().is_some());
        retry.connection_ended(Duration::from_millis(50));
        assert_eq!(retry.next_delay(), None);
        assert_eq!(retry.attempt(), 2);
    }

    #[test]
    fn retry_state_resets_after_healthy_connection() {
        let mut retry = RetryState::new(ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(5),
            max_retries: Some(1),
        });

        assert!(retry.next_delay().is_some());
        retry.delivered();
        assert!(retry.next_delay().is_some());
        retry.connection_ended(Duration::from_secs(5));
        assert_eq!(retry.attempt(), 0);
        assert!(retry.next_delay().is_some());
    }

    #[test]
    fn inbound_message_from_parts() {
        let msg = InboundMessage::new("dev/request", "{}");
        assert_eq!(msg.topic, "dev/request");
        assert_eq!(&msg.payload[..], b"{}");
    }
}
