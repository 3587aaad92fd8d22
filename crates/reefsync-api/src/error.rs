use thiserror::Error;

/// Top-level error type for the `reefsync-api` crate.
///
/// Covers every failure mode of the device and cloud HTTP surfaces.
/// `reefsync-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Token request rejected or bearer token refused after renewal.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS or client-builder error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Status ──────────────────────────────────────────────────────
    /// The endpoint answered with a status outside the success set.
    #[error("HTTP {status} on {path}")]
    Status { status: u16, path: String },

    /// Every attempt allowed by the retry policy failed.
    #[error("{path}: gave up after {attempts} attempts ({last})")]
    RetriesExhausted {
        path: String,
        attempts: u32,
        last: Box<Error>,
    },

    // ── Request shape ───────────────────────────────────────────────
    /// Method name not usable for a write.
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// HTTP status carried by this error, looking through retry wrappers.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Returns `true` for failures that a write must not retry:
    /// client errors 400/404 and methods that never reached the network.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::UnsupportedMethod(_))
            || matches!(
                self,
                Self::Status {
                    status: 400 | 404,
                    ..
                }
            )
    }

    /// Returns `true` if the bearer token was refused.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. }) || self.status() == Some(401)
    }

    /// Returns `true` if the error is a connect/timeout failure.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status >= 500,
            Self::RetriesExhausted { last, .. } => last.is_transient(),
            _ => false,
        }
    }
}

/// First 200 characters of a response body, for error messages.
pub(crate) fn preview(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_terminal() {
        let bad = Error::Status {
            status: 400,
            path: "/manual".into(),
        };
        let missing = Error::Status {
            status: 404,
            path: "/manual".into(),
        };
        let busy = Error::Status {
            status: 500,
            path: "/manual".into(),
        };
        assert!(bad.is_terminal());
        assert!(missing.is_terminal());
        assert!(!busy.is_terminal());
        assert!(busy.is_transient());
        assert!(Error::UnsupportedMethod("HEAD".into()).is_terminal());
    }

    #[test]
    fn status_looks_through_retry_wrapper() {
        let err = Error::RetriesExhausted {
            path: "/dashboard".into(),
            attempts: 5,
            last: Box::new(Error::Status {
                status: 401,
                path: "/dashboard".into(),
            }),
        };
        assert_eq!(err.status(), Some(401));
        assert!(err.is_auth_expired());
    }
}
