// ── Runtime connection configuration ──
//
// Describes how to reach one controller and how the communication layer
// behaves. Built by the collaborator and handed in; core never reads
// config files.

use std::collections::HashSet;
use std::time::Duration;

use cocolink_api::{Credentials, DEFAULT_PROFILE, TrustAnchors};

use crate::model::DeviceId;
use crate::scheduler::ReconnectConfig;

/// Default MQTT-over-TLS port of the controller.
pub const DEFAULT_PORT: u16 = 8884;

/// Configuration for communicating with a single controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Controller address (hostname or IP).
    pub host: String,
    pub port: u16,
    /// Topic profile; also the MQTT username.
    pub profile: String,
    /// `None` makes `start_communication` fail with a configuration error.
    pub credentials: Option<Credentials>,
    /// Private CA bundle the controller certificate chains to.
    pub trust: Option<TrustAnchors>,
    /// MQTT client id. Empty generates one per session.
    pub client_id: String,
    pub keep_alive: Duration,
    /// Bound on connect + subscribe.
    pub connect_timeout: Duration,
    /// How long `communication_active` waits for the device list.
    pub active_timeout: Duration,
    /// Bound on stopping the previous session before a restart.
    pub stop_timeout: Duration,
    pub reconnect: ReconnectConfig,
    /// Periodic full refresh. `None` disables it.
    pub refresh_interval: Option<Duration>,
    /// Overrule duration used when the caller gives none.
    pub default_overrule_minutes: i32,
    /// Live meter re-subscribe period.
    pub meter_resubscribe: Duration,
    /// Roller shutters that take the raw position scale.
    pub inverted_shutters: HashSet<DeviceId>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            profile: DEFAULT_PROFILE.into(),
            credentials: None,
            trust: None,
            client_id: String::new(),
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            active_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            reconnect: ReconnectConfig::default(),
            refresh_interval: None,
            default_overrule_minutes: 60,
            meter_resubscribe: Duration::from_secs(25),
            inverted_shutters: HashSet::new(),
        }
    }
}
