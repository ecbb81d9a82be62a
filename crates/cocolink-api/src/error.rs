use thiserror::Error;

/// Top-level error type for the `cocolink-api` crate.
///
/// Covers every failure mode of the wire layer: session setup, TLS,
/// credentials, publishing, and envelope (de)serialization.
/// `cocolink-core` maps these into controller-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Session ─────────────────────────────────────────────────────
    /// Publish or subscribe attempted while the session is not subscribed.
    #[error("Transport not connected")]
    NotConnected,

    /// Connecting or subscribing did not complete in time.
    #[error("Transport timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Broker connection failed or dropped (I/O, protocol, DNS).
    #[error("Connection error: {0}")]
    Connection(String),

    /// The broker refused the subscription or connection for a non-credential reason.
    #[error("Rejected by controller: {reason}")]
    Rejected { reason: String },

    /// The background event loop is gone.
    #[error("Transport channel closed")]
    ChannelClosed,

    // ── Security ────────────────────────────────────────────────────
    /// Trust anchor parsing or TLS handshake failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Token expired, malformed, or refused by the broker.
    #[error("Credential error: {reason}")]
    Credential { reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// Payload was not a valid envelope, with the raw body for debugging.
    #[error("Decode error: {message}")]
    Decode { message: String, body: String },

    /// Envelope could not be serialized.
    #[error("Encode error: {0}")]
    Encode(String),
}

impl Error {
    /// Returns `true` if a reconnect may resolve this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::Timeout { .. } | Self::Connection(_) | Self::ChannelClosed
        )
    }

    /// Returns `true` if only a configuration change can resolve this error.
    pub fn is_credential(&self) -> bool {
        matches!(self, Self::Credential { .. })
    }
}

impl From<rumqttc::ClientError> for Error {
    fn from(err: rumqttc::ClientError) -> Self {
        tracing::debug!(error = %err, "MQTT client request failed");
        Self::ChannelClosed
    }
}
