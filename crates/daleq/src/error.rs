//! CLI error types with miette diagnostics.
//!
//! Maps core and config errors into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use daleq_config::ConfigError;
use daleq_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the broker: {reason}")]
    #[diagnostic(
        code(daleq::connection_failed),
        help(
            "Check that the broker is running and accessible.\n\
             Override the address with: daleq run --host <HOST> --port <PORT>"
        )
    )]
    ConnectionFailed { reason: String },

    // ── Device tree ──────────────────────────────────────────────────
    #[error("Device tree error: {message}")]
    #[diagnostic(code(daleq::tree))]
    Tree { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(daleq::validation))]
    Validation { field: String, reason: String },

    #[error("Invalid JSON message: {0}")]
    #[diagnostic(
        code(daleq::json),
        help("Messages are JSON objects, e.g. '{{\"get\": \"enabled\"}}'")
    )]
    Json(#[from] serde_json::Error),

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(daleq::config),
        help("Inspect the resolved configuration with: daleq config show")
    )]
    Config(#[from] ConfigError),

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(daleq::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    // ── IO ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Validation { .. } | Self::Json(_) | Self::ConfigExists { .. } => {
                exit_code::USAGE
            }
            Self::Config(ConfigError::Tree(_)) | Self::Tree { .. } | Self::Io(_) => {
                exit_code::GENERAL
            }
            Self::Config(_) => exit_code::CONFIG,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed { reason },
            CoreError::Disconnected => CliError::ConnectionFailed {
                reason: "broker connection was lost".into(),
            },
            CoreError::SubscriptionFailed { pattern, reason } => CliError::ConnectionFailed {
                reason: format!("subscription to '{pattern}' failed: {reason}"),
            },
            CoreError::Io(e) => CliError::Io(e),
            other => CliError::Tree {
                message: other.to_string(),
            },
        }
    }
}
