// ── Core error types ──
//
// Errors surfaced by cocolink-core to its collaborator. Transport details
// are folded into connection or configuration failures by the
// `From<cocolink_api::Error>` impl; decode failures never reach this type.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Communication errors ─────────────────────────────────────────
    #[error("Cannot reach controller: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Controller disconnected")]
    ControllerDisconnected,

    #[error("Controller did not become active within {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    // ── Command errors ───────────────────────────────────────────────
    #[error("Device not ready: {id}")]
    DeviceNotReady { id: String },

    #[error("Invalid command for {id}: {reason}")]
    InvalidCommand { id: String, reason: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` when only a configuration change can fix this.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Returns `true` for failures of the controller link itself.
    pub fn is_communication(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::ControllerDisconnected | Self::Timeout { .. }
        )
    }
}

// ── Conversion from wire-layer errors ────────────────────────────────

impl From<cocolink_api::Error> for CoreError {
    fn from(err: cocolink_api::Error) -> Self {
        use cocolink_api::Error as Api;
        match err {
            Api::Credential { reason } => Self::Configuration { reason },
            Api::Tls(msg) => Self::ConnectionFailed {
                reason: format!("TLS: {msg}"),
            },
            Api::NotConnected | Api::ChannelClosed => Self::ControllerDisconnected,
            Api::Timeout { timeout_secs } => Self::Timeout { timeout_secs },
            Api::Connection(reason) | Api::Rejected { reason } => Self::ConnectionFailed { reason },
            Api::Decode { message, body: _ } => {
                Self::Internal(format!("Deserialization error: {message}"))
            }
            Api::Encode(msg) => Self::Internal(format!("Serialization error: {msg}")),
        }
    }
}
