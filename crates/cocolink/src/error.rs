//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use cocolink_config::ConfigError;
use cocolink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not communicate with the controller: {reason}")]
    #[diagnostic(
        code(cocolink::connection_failed),
        help(
            "Check that the controller is reachable on the MQTT port (8884)\n\
             and that --ca-cert points at the controller's CA bundle."
        )
    )]
    ConnectionFailed { reason: String },

    #[error("Controller did not deliver its device list within {seconds}s")]
    #[diagnostic(
        code(cocolink::timeout),
        help("Increase the wait with --timeout or check the controller's load.")
    )]
    Timeout { seconds: u64 },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Controller refused the configuration: {reason}")]
    #[diagnostic(
        code(cocolink::configuration),
        help(
            "Hobby API tokens expire; create a new one in the Niko Home app.\n\
             Run: cocolink config set-token --profile <name>"
        )
    )]
    Configuration { reason: String },

    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(cocolink::no_credentials),
        help(
            "Store one with: cocolink config set-token --profile {profile}\n\
             Or set the COCOLINK_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    #[error("No controller configured")]
    #[diagnostic(
        code(cocolink::no_config),
        help(
            "Pass --host and --ca-cert, or add a profile to the config file.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(cocolink::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(cocolink::config))]
    Config(#[from] ConfigError),

    // ── Devices ──────────────────────────────────────────────────────
    #[error("Device '{identifier}' not found")]
    #[diagnostic(
        code(cocolink::not_found),
        help("Run: cocolink devices to see available devices")
    )]
    NotFound { identifier: String },

    #[error("Device '{identifier}' matches more than one device")]
    #[diagnostic(code(cocolink::ambiguous), help("Use the device UUID instead of its name."))]
    Ambiguous { identifier: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(cocolink::validation))]
    Validation { field: String, reason: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(cocolink::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Configuration { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::Ambiguous { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => Self::ConnectionFailed { reason },
            CoreError::ControllerDisconnected => Self::ConnectionFailed {
                reason: "controller connection was lost".into(),
            },
            CoreError::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Configuration { reason } => Self::Configuration { reason },
            CoreError::DeviceNotReady { id } => Self::NotFound { identifier: id },
            CoreError::InvalidCommand { id, reason } => Self::Validation {
                field: id,
                reason,
            },
            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}
