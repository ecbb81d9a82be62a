//! Wire layer for the Niko Home Control Connected Controller.
//!
//! - [`codec`]: the JSON envelope (method + sparse parameter blocks)
//! - [`topic`]: profile-scoped topic namespace and classification
//! - [`transport`]: the [`Transport`] seam and the TLS MQTT implementation
//! - [`credentials`] / [`tls`]: bearer token validation and trust anchors

pub mod codec;
pub mod credentials;
pub mod error;
pub mod tls;
pub mod topic;
pub mod transport;

pub use codec::{Envelope, Parameter, Property, WireDevice, decode, encode};
pub use credentials::{Credentials, DEFAULT_PROFILE};
pub use error::Error;
pub use tls::TrustAnchors;
pub use topic::Topic;
pub use transport::{InboundMessage, MqttTransport, SessionTarget, Transport, TransportState};
