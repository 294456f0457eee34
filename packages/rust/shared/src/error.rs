//! Error types for RoofScout.
//!
//! Library crates use [`RoofScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// HTTP status code providers use to signal quota exhaustion.
pub const RATE_LIMIT_STATUS: u16 = 429;

/// Message marker Google APIs attach to quota exhaustion errors.
pub const RESOURCE_EXHAUSTED: &str = "RESOURCE_EXHAUSTED";

/// Top-level error type for all RoofScout operations.
#[derive(Debug, thiserror::Error)]
pub enum RoofScoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure talking to a provider.
    #[error("network error: {0}")]
    Network(String),

    /// The provider rejected the call because a request quota was exceeded.
    #[error("rate limited (HTTP {status}): {message}")]
    RateLimited { status: u16, message: String },

    /// Any other non-success answer from a provider.
    #[error("provider error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    /// Provider payload could not be decoded.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (empty export, bad region, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A scan was started while another one is still in flight.
    #[error("a scan is already in progress")]
    RunInProgress,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RoofScoutError>;

impl RoofScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build the right variant for a non-success provider answer.
    ///
    /// A 429 status or a `RESOURCE_EXHAUSTED` marker in the body yields
    /// [`RoofScoutError::RateLimited`]; everything else is a plain
    /// [`RoofScoutError::Provider`].
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == RATE_LIMIT_STATUS || message.contains(RESOURCE_EXHAUSTED) {
            Self::RateLimited { status, message }
        } else {
            Self::Provider { status, message }
        }
    }

    /// Whether this failure signals an exceeded request quota.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Provider { status, message } => {
                *status == RATE_LIMIT_STATUS || message_has_rate_limit_marker(message)
            }
            Self::Network(message) => message_has_rate_limit_marker(message),
            _ => false,
        }
    }
}

fn message_has_rate_limit_marker(message: &str) -> bool {
    message.contains("429") || message.contains(RESOURCE_EXHAUSTED)
}
