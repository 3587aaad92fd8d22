// ── Core error types ──
//
// Domain errors from reefsync-core. Consumers never see raw reqwest
// failures; the `From<reefsync_api::Error>` impl translates transport
// errors into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Device unreachable: {device} ({reason})")]
    DeviceUnreachable { device: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Request timed out")]
    Timeout,

    // ── Cache errors ─────────────────────────────────────────────────
    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    #[error("Invalid path expression '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Source not registered: {name}")]
    UnknownSource { name: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("{device} is not linked to a cloud account")]
    NotLinked { device: String },

    #[error("Operation not supported: {operation} on {kind}")]
    Unsupported { operation: String, kind: String },

    #[error("Operation rejected by device: {message}")]
    Rejected { message: String, status: Option<u16> },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("{failed} of {total} members failed: {first}")]
    PartialFailure {
        failed: usize,
        total: usize,
        first: Box<CoreError>,
    },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api { message: String, status: Option<u16> },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn unsupported(operation: impl Into<String>, kind: impl std::fmt::Display) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            kind: kind.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<reefsync_api::Error> for CoreError {
    fn from(err: reefsync_api::Error) -> Self {
        use reefsync_api::Error as ApiError;

        match err {
            ApiError::Authentication { message } => CoreError::AuthenticationFailed { message },
            ApiError::Transport(ref e) if e.is_timeout() => CoreError::Timeout,
            ApiError::Transport(ref e) => CoreError::Api {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            },
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            ApiError::Status { status, path } if matches!(status, 400 | 404) => CoreError::Rejected {
                message: format!("HTTP {status} on {path}"),
                status: Some(status),
            },
            ApiError::Status { status, path } => CoreError::Api {
                message: format!("HTTP {status} on {path}"),
                status: Some(status),
            },
            e @ ApiError::RetriesExhausted { .. } => CoreError::Api {
                status: e.status(),
                message: e.to_string(),
            },
            ApiError::UnsupportedMethod(method) => CoreError::Unsupported {
                operation: format!("HTTP {method}"),
                kind: "write".into(),
            },
            ApiError::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
