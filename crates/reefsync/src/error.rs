//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! help text.

use miette::Diagnostic;
use thiserror::Error;

use reefsync_config::ConfigError;
use reefsync_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach {device}")]
    #[diagnostic(
        code(reefsync::unreachable),
        help("Check the device's IP address in the config file and that it is powered on.\n{reason}")
    )]
    Unreachable { device: String, reason: String },

    #[error("Request timed out")]
    #[diagnostic(code(reefsync::timeout), help("Raise `timeout` under [defaults] in the config file."))]
    Timeout,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Cloud authentication failed: {message}")]
    #[diagnostic(
        code(reefsync::auth_failed),
        help("Store the password with: reefsync config set-password <username>")
    )]
    AuthFailed { message: String },

    // ── Lookup ───────────────────────────────────────────────────────
    #[error("Device '{name}' is not configured")]
    #[diagnostic(code(reefsync::unknown_device), help("Run: reefsync config show"))]
    UnknownDevice { name: String },

    #[error("No value at {path}")]
    #[diagnostic(code(reefsync::path_not_found), help("Use --missing-ok to print null instead."))]
    PathNotFound { path: String },

    // ── Operations ───────────────────────────────────────────────────
    #[error("{message}")]
    #[diagnostic(code(reefsync::unsupported))]
    Unsupported { message: String },

    #[error("{device} has no cloud link")]
    #[diagnostic(
        code(reefsync::not_linked),
        help("Add a [cloud] section whose account owns this device, or drop --cloud.")
    )]
    NotLinked { device: String },

    #[error("Device error: {message}")]
    #[diagnostic(code(reefsync::device))]
    Device { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(reefsync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("{source}")]
    #[diagnostic(code(reefsync::config), help("Config file: {path}"))]
    Config {
        #[source]
        source: ConfigError,
        path: String,
    },

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(reefsync::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Unreachable { .. } => exit_code::CONNECTION,
            Self::Timeout => exit_code::TIMEOUT,
            Self::AuthFailed { .. } => exit_code::AUTH,
            Self::UnknownDevice { .. } | Self::PathNotFound { .. } => exit_code::NOT_FOUND,
            Self::Unsupported { .. } | Self::NotLinked { .. } => exit_code::UNSUPPORTED,
            Self::Validation { .. } | Self::Config { .. } => exit_code::USAGE,
            Self::Device { .. } | Self::Io(_) | Self::Json(_) => exit_code::GENERAL,
        }
    }

    pub fn config(source: ConfigError, path: &std::path::Path) -> Self {
        match source {
            ConfigError::UnknownDevice { name } => Self::UnknownDevice { name },
            source => Self::Config {
                source,
                path: path.display().to_string(),
            },
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DeviceUnreachable { device, reason } => Self::Unreachable { device, reason },
            CoreError::Timeout => Self::Timeout,
            CoreError::AuthenticationFailed { message } => Self::AuthFailed { message },
            CoreError::PathNotFound { path } => Self::PathNotFound { path },
            CoreError::InvalidPath { path, reason } => Self::Validation {
                field: format!("path '{path}'"),
                reason,
            },
            CoreError::Validation { message } => Self::Validation {
                field: "argument".into(),
                reason: message,
            },
            e @ (CoreError::Unsupported { .. } | CoreError::UnknownSource { .. }) => Self::Unsupported {
                message: e.to_string(),
            },
            CoreError::NotLinked { device } => Self::NotLinked { device },
            other => Self::Device {
                message: other.to_string(),
            },
        }
    }
}
