// ── Collaborator callbacks ──
//
// The controller reports link status and controller-level events to the
// platform through `ControllerEvents`. `BroadcastEvents` fans the same
// events out over a broadcast channel for any number of consumers.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use cocolink_api::codec::SystemInfo;

/// Platform-side observer for controller-level events.
///
/// Every method has an empty default, so implementors pick what they need.
pub trait ControllerEvents: Send + Sync + 'static {
    /// The device list has been received; the session is usable.
    fn controller_online(&self) {}

    /// The link was lost or a command could not be delivered.
    fn controller_offline(&self, _reason: &str) {}

    /// A configuration change is required; no retry will happen.
    fn configuration_error(&self, _reason: &str) {}

    fn alarm_event(&self, _text: &str) {}

    fn notice_event(&self, _text: &str) {}

    /// Controller system information was (re)published.
    fn properties_changed(&self, _info: &SystemInfo) {}
}

impl ControllerEvents for () {}

// ── Broadcast adapter ────────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ControllerEvent {
    Online,
    Offline { reason: String },
    ConfigurationError { reason: String },
    Alarm { text: String },
    Notice { text: String },
    PropertiesChanged { info: SystemInfo },
}

/// `ControllerEvents` that republishes every callback as a [`ControllerEvent`].
#[derive(Debug, Clone)]
pub struct BroadcastEvents {
    tx: broadcast::Sender<ControllerEvent>,
}

impl Default for BroadcastEvents {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

impl BroadcastEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// New receiver; slow consumers see `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.tx.subscribe()
    }

    /// Receiver wrapped as a `Stream`.
    pub fn stream(&self) -> BroadcastStream<ControllerEvent> {
        BroadcastStream::new(self.tx.subscribe())
    }

    fn send(&self, event: ControllerEvent) {
        // No receivers is fine.
        let _ = self.tx.send(event);
    }
}

impl ControllerEvents for BroadcastEvents {
    fn controller_online(&self) {
        self.send(ControllerEvent::Online);
    }

    fn controller_offline(&self, reason: &str) {
        self.send(ControllerEvent::Offline {
            reason: reason.to_owned(),
        });
    }

    fn configuration_error(&self, reason: &str) {
        self.send(ControllerEvent::ConfigurationError {
            reason: reason.to_owned(),
        });
    }

    fn alarm_event(&self, text: &str) {
        self.send(ControllerEvent::Alarm {
            text: text.to_owned(),
        });
    }

    fn notice_event(&self, text: &str) {
        self.send(ControllerEvent::Notice {
            text: text.to_owned(),
        });
    }

    fn properties_changed(&self, info: &SystemInfo) {
        self.send(ControllerEvent::PropertiesChanged { info: info.clone() });
    }
}
