use thiserror::Error;

/// Top-level error type for the `daleq-api` crate.
///
/// Covers every failure mode of the transport layer: connecting to a
/// broker, subscribing, and decoding inbound payloads.
/// `daleq-core` wraps these into its own error type.
#[derive(Debug, Error)]
pub enum Error {
    // ── Connection ──────────────────────────────────────────────────
    /// Could not reach the broker (refused, DNS failure, handshake error).
    #[error("Transport connection failed: {0}")]
    Connect(String),

    /// Broker closed the connection.
    #[error("Transport closed (code {code}): {reason}")]
    Closed { code: u16, reason: String },

    /// An operation that needs a live connection was called before `connect`.
    #[error("Transport is not connected")]
    NotConnected,

    /// URL built from host/port did not parse.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Subscriptions ───────────────────────────────────────────────
    /// The subscribe request could not be delivered to the broker.
    #[error("Subscription to '{pattern}' failed: {reason}")]
    Subscribe { pattern: String, reason: String },

    // ── Payloads ────────────────────────────────────────────────────
    /// Payload bytes are not UTF-8.
    #[error("Payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Payload text is not JSON.
    #[error("Payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
