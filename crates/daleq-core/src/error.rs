// ── Core error types ──
//
// Errors surfaced by the device tree. Property misses and malformed
// messages are NOT errors: they answer `None` / `false` during dispatch.
// The `From<daleq_api::Error>` impl translates transport-layer errors
// into variants consumers can act on.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Tree errors ──────────────────────────────────────────────────
    #[error("Device '{device}' is already owned by '{owner}'")]
    AlreadyOwned { device: String, owner: String },

    #[error("Bus '{bus}' already has a child with id '{id}'")]
    DuplicateId { bus: String, id: String },

    // ── Device errors ────────────────────────────────────────────────
    #[error("Setup of device '{device}' failed: {message}")]
    Setup { device: String, message: String },

    // ── Store errors ─────────────────────────────────────────────────
    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Transport errors (wrapped, not exposed raw) ──────────────────
    #[error("Cannot connect to broker: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Transport is not connected")]
    Disconnected,

    #[error("Subscription to '{pattern}' failed: {reason}")]
    SubscriptionFailed { pattern: String, reason: String },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<daleq_api::Error> for CoreError {
    fn from(err: daleq_api::Error) -> Self {
        match err {
            daleq_api::Error::Connect(reason) => CoreError::ConnectionFailed { reason },
            daleq_api::Error::Closed { code, reason } => CoreError::ConnectionFailed {
                reason: format!("closed (code {code}): {reason}"),
            },
            daleq_api::Error::InvalidUrl(e) => CoreError::ConnectionFailed {
                reason: format!("invalid broker address: {e}"),
            },
            daleq_api::Error::NotConnected => CoreError::Disconnected,
            daleq_api::Error::Subscribe { pattern, reason } => {
                CoreError::SubscriptionFailed { pattern, reason }
            }
            // Only bridge frames the transport could not parse end up here.
            err @ (daleq_api::Error::Utf8(_) | daleq_api::Error::Json(_)) => {
                CoreError::ConnectionFailed {
                    reason: format!("malformed broker frame: {err}"),
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_translate() {
        let err = CoreError::from(daleq_api::Error::NotConnected);
        assert!(matches!(err, CoreError::Disconnected));

        let err = CoreError::from(daleq_api::Error::Closed {
            code: 1001,
            reason: "going away".into(),
        });
        assert_eq!(
            err.to_string(),
            "Cannot connect to broker: closed (code 1001): going away"
        );

        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = CoreError::from(daleq_api::Error::Json(json));
        assert!(matches!(
            err,
            CoreError::ConnectionFailed { ref reason } if reason.starts_with("malformed broker frame")
        ));
    }

    #[test]
    fn ownership_message_names_both_sides() {
        let err = CoreError::AlreadyOwned {
            device: "d1".into(),
            owner: "fractal/bus1".into(),
        };
        assert_eq!(err.to_string(), "Device 'd1' is already owned by 'fractal/bus1'");
    }
}
