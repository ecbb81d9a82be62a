// ── Device models ──
//
// One typed state holder per device category. The category is decided
// once from the wire metadata when the device is first seen and never
// changes; `apply_state` and `encode_command` dispatch on it statically.

pub mod access;
pub mod action;
pub mod alarm;
pub mod handler;
pub mod id;
pub mod meter;
pub mod thermostat;
pub mod video;

use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cocolink_api::{Parameter, Property, WireDevice};

use crate::error::CoreError;

pub use access::{AccessCommand, AccessKind, AccessState, VideoLink};
pub use action::{ActionCommand, ActionKind, ActionState};
pub use alarm::{AlarmCommand, AlarmState};
pub use handler::{DeviceHandler, HandlerSlot};
pub use id::{DeviceId, MacAddress};
pub use meter::{MeterKind, MeterState};
pub use thermostat::{Demand, ThermostatMode, ThermostatState};
pub use video::VideoState;

/// Outbound property blocks; each inner list becomes one envelope.
pub type Encoded = Vec<Vec<Property>>;

/// A command value outside the device's domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidValue(pub String);

impl fmt::Display for InvalidValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvalidValue {}

// ── Category ─────────────────────────────────────────────────────────

/// Closed set of device categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "category", content = "kind", rename_all = "kebab-case")]
pub enum DeviceCategory {
    Action(ActionKind),
    Thermostat,
    Meter(MeterKind),
    Access(AccessKind),
    Video,
    Alarm,
}

impl DeviceCategory {
    /// Decide the category from wire metadata. `None` for unsupported devices.
    pub fn classify(device_type: Option<&str>, model: Option<&str>) -> Option<Self> {
        let device_type = device_type.unwrap_or_default().to_ascii_lowercase();
        let model = model.unwrap_or_default().to_ascii_lowercase();

        if model == "videodoorstation" || device_type == "videodoorstation" {
            return Some(Self::Video);
        }

        match device_type.as_str() {
            "action" => match model.as_str() {
                "generic" | "pir" | "simulation" | "comfort" | "alloff" | "overallcomfort"
                | "garagedoor" => Some(Self::Action(ActionKind::Trigger)),
                "light" | "socket" | "switched-generic" | "switched-fan" => {
                    Some(Self::Action(ActionKind::Relay))
                }
                "dimmer" => Some(Self::Action(ActionKind::Dimmer)),
                "rolldownshutter" | "sunblind" | "venetianblind" | "gate" => {
                    Some(Self::Action(ActionKind::RollerShutter))
                }
                "alarms" => Some(Self::Alarm),
                "bellbutton" => Some(Self::Access(AccessKind::BellButton)),
                _ => None,
            },
            "thermostat" | "hvac" => Some(Self::Thermostat),
            "centralmeter" | "energyhome" => Some(Self::Meter(
                if model.contains("clamp") || device_type == "energyhome" {
                    MeterKind::LiveEnergy
                } else if model.contains("gas") {
                    MeterKind::Gas
                } else if model.contains("water") {
                    MeterKind::Water
                } else {
                    MeterKind::Energy
                },
            )),
            "accesscontrol" => Some(Self::Access(match model.as_str() {
                "ringandcomein" => AccessKind::RingAndComeIn,
                "bellbutton" => AccessKind::BellButton,
                _ => AccessKind::Base,
            })),
            _ => None,
        }
    }

    pub fn from_wire(device: &WireDevice) -> Option<Self> {
        Self::classify(device.device_type.as_deref(), device.model.as_deref())
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(kind) => write!(f, "action/{kind}"),
            Self::Thermostat => f.write_str("thermostat"),
            Self::Meter(kind) => write!(f, "meter/{kind}"),
            Self::Access(kind) => write!(f, "access/{kind}"),
            Self::Video => f.write_str("video"),
            Self::Alarm => f.write_str("alarm"),
        }
    }
}

// ── Identity ─────────────────────────────────────────────────────────

/// Vendor discriminators, used only for property reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMeta {
    pub device_type: Option<String>,
    pub technology: Option<String>,
    pub model: Option<String>,
}

impl DeviceMeta {
    pub fn from_wire(device: &WireDevice) -> Self {
        Self {
            device_type: device.device_type.clone(),
            technology: device.technology.clone(),
            model: device.model.clone(),
        }
    }
}

/// Identity of a device. `id` and `category` never change after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    id: DeviceId,
    category: DeviceCategory,
    pub name: String,
    pub location: Option<String>,
    pub meta: DeviceMeta,
}

impl DeviceInfo {
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn category(&self) -> DeviceCategory {
        self.category
    }
}

// ── State ────────────────────────────────────────────────────────────

/// Live state, one variant per category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DeviceState {
    Action(ActionState),
    Thermostat(ThermostatState),
    Meter(MeterState),
    Access(AccessState),
    Video(VideoState),
    Alarm(AlarmState),
}

impl DeviceState {
    fn initial(category: DeviceCategory, params: &Parameter) -> Self {
        match category {
            DeviceCategory::Action(_) => Self::Action(ActionState::default()),
            DeviceCategory::Thermostat => Self::Thermostat(ThermostatState::default()),
            DeviceCategory::Meter(_) => Self::Meter(MeterState::default()),
            DeviceCategory::Access(_) => Self::Access(AccessState {
                video: params.button_id.as_deref().and_then(VideoLink::parse),
                ..AccessState::default()
            }),
            DeviceCategory::Video => Self::Video(VideoState::from_parameters(params)),
            DeviceCategory::Alarm => Self::Alarm(AlarmState::default()),
        }
    }
}

/// Full reconciled view of a device, handed to handlers and callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub info: DeviceInfo,
    pub state: DeviceState,
}

// ── Commands ─────────────────────────────────────────────────────────

/// Everything a collaborator can ask a device to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    Action(ActionCommand),
    ThermostatMode(ThermostatMode),
    /// Setpoint in tenths of °C; `None` minutes uses the configured default.
    ThermostatOverrule {
        setpoint: i32,
        minutes: Option<i32>,
    },
    MeterLive(bool),
    Access(AccessCommand),
    Alarm(AlarmCommand),
}

// ── Device ───────────────────────────────────────────────────────────

/// One device model. Constructed and destroyed only by the registry.
#[derive(Debug)]
pub struct Device {
    info: DeviceInfo,
    state: DeviceState,
    handler: HandlerSlot,
    removed: bool,
}

impl Device {
    pub(crate) fn new(
        id: DeviceId,
        category: DeviceCategory,
        name: String,
        location: Option<String>,
        meta: DeviceMeta,
        params: &Parameter,
    ) -> Self {
        Self {
            state: DeviceState::initial(category, params),
            info: DeviceInfo {
                id,
                category,
                name,
                location,
                meta,
            },
            handler: HandlerSlot::default(),
            removed: false,
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            info: self.info.clone(),
            state: self.state.clone(),
        }
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    pub(crate) fn state_mut(&mut self) -> &mut DeviceState {
        &mut self.state
    }

    pub(crate) fn rename(&mut self, name: String, location: Option<String>) {
        self.info.name = name;
        if location.is_some() {
            self.info.location = location;
        }
    }

    pub(crate) fn set_inverted(&mut self, inverted: bool) {
        if let DeviceState::Action(state) = &mut self.state {
            state.inverted = inverted;
        }
    }

    // ── Handler relation ──

    pub fn register_handler(&mut self, handler: Weak<dyn DeviceHandler>) {
        self.handler.register(handler);
    }

    pub fn unregister_handler(&mut self) {
        self.handler.unregister();
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_registered()
    }

    /// Invoke the handler with the current full snapshot, if one is live.
    pub(crate) fn notify(&self) {
        if self.removed {
            return;
        }
        if let Some(handler) = self.handler.get() {
            handler.state_changed(&self.snapshot());
        }
    }

    /// Mark removed, send the final notification, and drop the handler.
    pub(crate) fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        if let Some(handler) = self.handler.take() {
            handler.removed(&self.info.id);
        }
    }

    // ── State and commands ──

    /// Merge the present fields of `view` into live state and notify once.
    ///
    /// Returns the video buttons touched by this delta so the registry can
    /// propagate rings to linked access points. A removed device ignores it.
    pub fn apply_state(&mut self, view: &Property, now: DateTime<Utc>) -> Vec<u8> {
        if self.removed {
            return Vec::new();
        }

        let touched = match (self.info.category, &mut self.state) {
            (DeviceCategory::Action(kind), DeviceState::Action(s)) => {
                s.apply(kind, view);
                Vec::new()
            }
            (DeviceCategory::Thermostat, DeviceState::Thermostat(s)) => {
                s.apply(view);
                Vec::new()
            }
            (DeviceCategory::Meter(_), DeviceState::Meter(s)) => {
                s.apply(view, now);
                Vec::new()
            }
            (DeviceCategory::Access(kind), DeviceState::Access(s)) => {
                s.apply(kind, view);
                Vec::new()
            }
            (DeviceCategory::Video, DeviceState::Video(s)) => s.apply(view),
            (DeviceCategory::Alarm, DeviceState::Alarm(s)) => {
                s.apply(view);
                Vec::new()
            }
            (category, _) => {
                tracing::error!(device = %self.info.id, %category, "State variant does not match category");
                return Vec::new();
            }
        };

        self.notify();
        touched
    }

    /// Encode `command` into outbound property blocks without touching state.
    pub fn encode_command(
        &self,
        command: &DeviceCommand,
        default_overrule_minutes: i32,
    ) -> Result<Encoded, CoreError> {
        let invalid = |reason: String| CoreError::InvalidCommand {
            id: self.info.id.to_string(),
            reason,
        };

        match (self.info.category, &self.state, command) {
            (DeviceCategory::Action(kind), DeviceState::Action(s), DeviceCommand::Action(c)) => {
                s.encode(kind, *c).map_err(|e| invalid(e.0))
            }
            (DeviceCategory::Thermostat, _, DeviceCommand::ThermostatMode(mode)) => {
                Ok(ThermostatState::encode_mode(*mode))
            }
            (DeviceCategory::Thermostat, _, DeviceCommand::ThermostatOverrule { setpoint, minutes }) => {
                ThermostatState::encode_overrule(*setpoint, *minutes, default_overrule_minutes)
                    .map_err(|e| invalid(e.0))
            }
            (DeviceCategory::Meter(kind), _, DeviceCommand::MeterLive(enable)) => {
                if kind.supports_live() {
                    Ok(MeterState::encode_live(*enable))
                } else {
                    Err(invalid(format!("{kind} meters have no live readings")))
                }
            }
            (DeviceCategory::Access(kind), _, DeviceCommand::Access(c)) => {
                AccessState::encode(kind, *c).map_err(|e| invalid(e.0))
            }
            (DeviceCategory::Alarm, _, DeviceCommand::Alarm(c)) => Ok(AlarmState::encode(*c)),
            (category, _, command) => Err(invalid(format!(
                "{command:?} does not apply to a {category} device"
            ))),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

pub(crate) fn property(f: impl FnOnce(&mut Property)) -> Property {
    let mut p = Property::default();
    f(&mut p);
    p
}

pub(crate) fn parse_int(raw: Option<&str>) -> Option<i64> {
    raw?.trim().parse().ok()
}

/// Shared handle type the registry stores per device.
pub type DeviceEntry = Arc<std::sync::Mutex<Device>>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        snapshots: Mutex<Vec<DeviceSnapshot>>,
        removed: Mutex<Vec<DeviceId>>,
    }

    impl DeviceHandler for Recorder {
        fn state_changed(&self, snapshot: &DeviceSnapshot) {
            self.snapshots.lock().unwrap().push(snapshot.clone());
        }

        fn removed(&self, id: &DeviceId) {
            self.removed.lock().unwrap().push(id.clone());
        }
    }

    fn weak(recorder: &Arc<Recorder>) -> Weak<dyn DeviceHandler> {
        let handler: Arc<dyn DeviceHandler> = recorder.clone();
        Arc::downgrade(&handler)
    }

    fn device(category: DeviceCategory) -> Device {
        Device::new(
            DeviceId::new("d1"),
            category,
            "Device".into(),
            None,
            DeviceMeta::default(),
            &Parameter::default(),
        )
    }

    #[test]
    fn classify_known_models() {
        let cases = [
            (("action", "light"), DeviceCategory::Action(ActionKind::Relay)),
            (("action", "dimmer"), DeviceCategory::Action(ActionKind::Dimmer)),
            (("action", "sunblind"), DeviceCategory::Action(ActionKind::RollerShutter)),
            (("action", "pir"), DeviceCategory::Action(ActionKind::Trigger)),
            (("action", "alarms"), DeviceCategory::Alarm),
            (("hvac", "hvacthermostat"), DeviceCategory::Thermostat),
            (("centralmeter", "electricity-clamp-centralmeter"), DeviceCategory::Meter(MeterKind::LiveEnergy)),
            (("centralmeter", "gas-centralmeter"), DeviceCategory::Meter(MeterKind::Gas)),
            (("centralmeter", "electricity-centralmeter"), DeviceCategory::Meter(MeterKind::Energy)),
            (("accesscontrol", "ringandcomein"), DeviceCategory::Access(AccessKind::RingAndComeIn)),
            (("action", "videodoorstation"), DeviceCategory::Video),
        ];
        for ((t, m), expected) in cases {
            assert_eq!(DeviceCategory::classify(Some(t), Some(m)), Some(expected), "{t}/{m}");
        }
        assert_eq!(DeviceCategory::classify(Some("action"), Some("audio")), None);
        assert_eq!(DeviceCategory::classify(None, None), None);
    }

    #[test]
    fn apply_notifies_once_with_full_snapshot() {
        let recorder = Arc::new(Recorder::default());
        let mut dev = device(DeviceCategory::Action(ActionKind::Dimmer));
        dev.register_handler(weak(&recorder));

        dev.apply_state(&property(|p| p.brightness = Some("60".into())), Utc::now());
        dev.apply_state(&property(|p| p.status = Some("On".into())), Utc::now());

        let snaps = recorder.snapshots.lock().unwrap();
        assert_eq!(snaps.len(), 2);
        assert_eq!(
            snaps[1].state,
            DeviceState::Action(ActionState {
                on: true,
                level: 60,
                ..ActionState::default()
            })
        );
    }

    #[test]
    fn removal_notifies_once_and_freezes_state() {
        let recorder = Arc::new(Recorder::default());
        let mut dev = device(DeviceCategory::Alarm);
        dev.register_handler(weak(&recorder));

        dev.remove();
        dev.remove();
        dev.apply_state(&property(|p| p.state = Some("Armed".into())), Utc::now());

        assert_eq!(recorder.removed.lock().unwrap().len(), 1);
        assert!(recorder.snapshots.lock().unwrap().is_empty());
        assert_eq!(dev.state(), &DeviceState::Alarm(AlarmState::default()));
        assert!(!dev.has_handler());
    }

    #[test]
    fn reregistering_replaces_handler() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let mut dev = device(DeviceCategory::Thermostat);
        dev.register_handler(weak(&first));
        dev.register_handler(weak(&second));

        dev.apply_state(&property(|p| p.program = Some("Eco".into())), Utc::now());
        assert!(first.snapshots.lock().unwrap().is_empty());
        assert_eq!(second.snapshots.lock().unwrap().len(), 1);

        dev.unregister_handler();
        dev.unregister_handler();
        dev.apply_state(&property(|p| p.program = Some("Day".into())), Utc::now());
        assert_eq!(second.snapshots.lock().unwrap().len(), 1);
    }

    #[test]
    fn command_for_wrong_category_is_invalid() {
        let dev = device(DeviceCategory::Thermostat);
        let err = dev
            .encode_command(&DeviceCommand::Alarm(AlarmCommand::Arm), 60)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidCommand { .. }));
    }

    #[test]
    fn live_readings_only_for_live_meters() {
        let gas = device(DeviceCategory::Meter(MeterKind::Gas));
        assert!(gas.encode_command(&DeviceCommand::MeterLive(true), 60).is_err());

        let live = device(DeviceCategory::Meter(MeterKind::LiveEnergy));
        assert!(live.encode_command(&DeviceCommand::MeterLive(true), 60).is_ok());
    }
}
