//! Envelope codec.
//!
//! Every message on the wire is a JSON object `{"Method": ..., "Params": [...]}`
//! with PascalCase keys. Payloads are sparse: an update only carries the
//! properties that changed, so every field here is optional and unknown
//! keys are ignored. [`encode`] and [`decode`] are pure functions of their
//! input.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;

// ── Method names ─────────────────────────────────────────────────────

/// Method strings carried in the envelope.
pub mod method {
    pub const SYSTEMINFO_PUBLISH: &str = "systeminfo.publish";
    pub const SYSTEMINFO_PUBLISHED: &str = "systeminfo.published";
    pub const TIME_PUBLISHED: &str = "time.published";
    pub const SERVICES_LIST: &str = "services.list";
    pub const PROFILES_LIST: &str = "profiles.list";
    pub const DEVICES_LIST: &str = "devices.list";
    pub const DEVICES_ADDED: &str = "devices.added";
    pub const DEVICES_REMOVED: &str = "devices.removed";
    pub const DEVICES_STATUS: &str = "devices.status";
    pub const DEVICES_CHANGED: &str = "devices.changed";
    pub const DEVICES_CONTROL: &str = "devices.control";
    pub const NOTIFICATIONS_LIST: &str = "notifications.list";
    pub const NOTIFICATIONS_RAISED: &str = "notifications.raised";
}

// ── Envelope ─────────────────────────────────────────────────────────

/// One complete protocol message: a method name plus parameter blocks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Envelope {
    #[serde(default)]
    pub method: String,

    #[serde(
        default,
        deserialize_with = "nullable_vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub params: Vec<Param>,
}

impl Envelope {
    /// A parameterless request, as used by the handshake.
    pub fn request(method: &str) -> Self {
        Self {
            method: method.to_owned(),
            params: Vec::new(),
        }
    }

    /// A `devices.control` message for a single device.
    pub fn device_control(uuid: &str, properties: Vec<Property>) -> Self {
        Self {
            method: method::DEVICES_CONTROL.to_owned(),
            params: vec![Param {
                devices: Some(vec![WireDevice {
                    uuid: Some(uuid.to_owned()),
                    properties,
                    ..WireDevice::default()
                }]),
                ..Param::default()
            }],
        }
    }

    /// All devices across every parameter block.
    pub fn devices(&self) -> impl Iterator<Item = &WireDevice> {
        self.params
            .iter()
            .filter_map(|p| p.devices.as_deref())
            .flatten()
    }

    /// The first system-info record, if any block carries one.
    pub fn system_info(&self) -> Option<&SystemInfo> {
        self.params
            .iter()
            .filter_map(|p| p.system_info.as_deref())
            .find_map(<[SystemInfo]>::first)
    }

    /// The first time-info record, if any block carries one.
    pub fn time_info(&self) -> Option<&TimeInfo> {
        self.params
            .iter()
            .filter_map(|p| p.time_info.as_deref())
            .find_map(<[TimeInfo]>::first)
    }

    /// The service list of the first block that carries one.
    pub fn services(&self) -> Option<&[Service]> {
        self.params.iter().find_map(|p| p.services.as_deref())
    }

    /// All notifications across every parameter block.
    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.params
            .iter()
            .filter_map(|p| p.notifications.as_deref())
            .flatten()
    }
}

/// One typed parameter block. At most a few of these lists are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Param {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<WireDevice>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_info: Option<Vec<SystemInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_info: Option<Vec<TimeInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<Service>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<Vec<Notification>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profiles: Option<Vec<Profile>>,
}

// ── Devices ──────────────────────────────────────────────────────────

/// A device record as it appears in list responses and events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireDevice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "Type", skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technology: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<String>,
    #[serde(
        default,
        deserialize_with = "nullable_vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub properties: Vec<Property>,
    #[serde(
        default,
        deserialize_with = "nullable_vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub parameters: Vec<Parameter>,
}

impl WireDevice {
    /// Collapse the property list into one view, first occurrence wins.
    pub fn property_view(&self) -> Property {
        Property::collapse(&self.properties)
    }

    /// Collapse the parameter list into one view, first occurrence wins.
    pub fn parameter_view(&self) -> Parameter {
        Parameter::collapse(&self.parameters)
    }
}

/// A sparse set of device properties. All values travel as strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Property {
    // action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moving: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    // thermostat
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambient_temperature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setpoint_temperature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrule_active: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrule_setpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrule_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eco_save: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_mode: Option<String>,

    // meter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electrical_power: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_instant_usage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_reading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_reading: Option<String>,

    // access control and video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doorlock_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_status01: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_status02: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_status03: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_status04: Option<String>,

    // alarm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<String>,
}

macro_rules! first_present {
    ($list:expr, $($field:ident),+ $(,)?) => {{
        let mut out = Self::default();
        for item in $list {
            $(
                if out.$field.is_none() {
                    out.$field.clone_from(&item.$field);
                }
            )+
        }
        out
    }};
}

impl Property {
    /// Merge a property list into a single view; the first value seen wins.
    pub fn collapse(list: &[Self]) -> Self {
        first_present!(
            list,
            status,
            basic_state,
            brightness,
            position,
            moving,
            action,
            program,
            ambient_temperature,
            setpoint_temperature,
            overrule_active,
            overrule_setpoint,
            overrule_time,
            eco_save,
            demand,
            operation_mode,
            electrical_power,
            report_instant_usage,
            total_reading,
            day_reading,
            doorlock_state,
            call_status01,
            call_status02,
            call_status03,
            call_status04,
            state,
            control,
        )
    }

    /// Call status for a video-station button, 1-based as on the wire.
    pub fn call_status(&self, button: u8) -> Option<&str> {
        match button {
            1 => self.call_status01.as_deref(),
            2 => self.call_status02.as_deref(),
            3 => self.call_status03.as_deref(),
            4 => self.call_status04.as_deref(),
            _ => None,
        }
    }
}

/// Static device parameters: location and video-link metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mjpeg_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tn_uri: Option<String>,
}

impl Parameter {
    /// Merge a parameter list into a single view; the first value seen wins.
    pub fn collapse(list: &[Self]) -> Self {
        first_present!(
            list,
            location_name,
            button_id,
            mac_address,
            ip_address,
            mjpeg_uri,
            tn_uri,
        )
    }
}

// ── Controller information ───────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SystemInfo {
    #[serde(default, rename = "SWversion", skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub electricity_tariff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_tariff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_tariff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TimeInfo {
    #[serde(default, rename = "GMTOffset", skip_serializing_if = "Option::is_none")]
    pub gmt_offset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, rename = "IsDST", skip_serializing_if = "Option::is_none")]
    pub is_dst: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Service {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, rename = "Type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// ── Encode / decode ──────────────────────────────────────────────────

/// Serialize an envelope to payload bytes.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(envelope).map_err(|e| Error::Encode(e.to_string()))
}

/// Parse payload bytes into an envelope.
pub fn decode(payload: &[u8]) -> Result<Envelope, Error> {
    serde_json::from_slice(payload).map_err(|e| Error::Decode {
        message: e.to_string(),
        body: String::from_utf8_lossy(payload).into_owned(),
    })
}

/// Treat an explicit `null` list the same as an absent one.
fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decode_sparse_device_event() {
        let raw = br#"{
            "Method": "devices.status",
            "Params": [{
                "Devices": [{
                    "Uuid": "a1",
                    "Properties": [{"Brightness": "40"}, {"Status": "On"}]
                }]
            }]
        }"#;

        let env = decode(raw).unwrap();
        assert_eq!(env.method, method::DEVICES_STATUS);

        let device = env.devices().next().unwrap();
        assert_eq!(device.uuid.as_deref(), Some("a1"));
        assert!(device.name.is_none());

        let view = device.property_view();
        assert_eq!(view.brightness.as_deref(), Some("40"));
        assert_eq!(view.status.as_deref(), Some("On"));
        assert!(view.basic_state.is_none());
        assert!(view.position.is_none());
    }

    #[test]
    fn decode_ignores_unknown_keys_and_nulls() {
        let raw = br#"{
            "Method": "devices.list",
            "Params": [{
                "Devices": [{
                    "Uuid": "t1",
                    "Type": "thermostat",
                    "Properties": null,
                    "Parameters": [{"LocationName": "Hall"}, {"Unheard": "x"}],
                    "SomethingNew": {"Nested": true}
                }],
                "FutureBlock": [1, 2, 3]
            }]
        }"#;

        let env = decode(raw).unwrap();
        let device = env.devices().next().unwrap();
        assert!(device.properties.is_empty());
        assert_eq!(device.device_type.as_deref(), Some("thermostat"));
        assert_eq!(device.parameter_view().location_name.as_deref(), Some("Hall"));
    }

    #[test]
    fn decode_envelope_without_params() {
        let env = decode(br#"{"Method":"devices.list","Params":null}"#).unwrap();
        assert!(env.params.is_empty());
        assert_eq!(env.devices().count(), 0);
    }

    #[test]
    fn decode_malformed_payload_keeps_body() {
        let err = decode(b"{not json").unwrap_err();
        match err {
            Error::Decode { body, .. } => assert_eq!(body, "{not json"),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn collapse_prefers_first_occurrence() {
        let list = vec![
            Property {
                status: Some("On".into()),
                ..Property::default()
            },
            Property {
                status: Some("Off".into()),
                brightness: Some("10".into()),
                ..Property::default()
            },
        ];
        let view = Property::collapse(&list);
        assert_eq!(view.status.as_deref(), Some("On"));
        assert_eq!(view.brightness.as_deref(), Some("10"));
    }

    #[test]
    fn call_status_by_button() {
        let view = Property {
            call_status02: Some("Ringing".into()),
            ..Property::default()
        };
        assert_eq!(view.call_status(2), Some("Ringing"));
        assert_eq!(view.call_status(1), None);
        assert_eq!(view.call_status(9), None);
    }

    #[test]
    fn encode_device_control_shape() {
        let env = Envelope::device_control(
            "d-1",
            vec![
                Property {
                    overrule_active: Some("True".into()),
                    ..Property::default()
                },
                Property {
                    overrule_setpoint: Some("21.5".into()),
                    ..Property::default()
                },
            ],
        );
        let value: serde_json::Value = serde_json::from_slice(&encode(&env).unwrap()).unwrap();

        insta::assert_json_snapshot!(value, @r#"
        {
          "Method": "devices.control",
          "Params": [
            {
              "Devices": [
                {
                  "Properties": [
                    {
                      "OverruleActive": "True"
                    },
                    {
                      "OverruleSetpoint": "21.5"
                    }
                  ],
                  "Uuid": "d-1"
                }
              ]
            }
          ]
        }
        "#);
    }

    #[test]
    fn encode_request_omits_params() {
        let bytes = encode(&Envelope::request(method::DEVICES_LIST)).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"Method":"devices.list"}"#
        );
    }

    #[test]
    fn decode_system_and_time_info() {
        let raw = br#"{
            "Method": "systeminfo.published",
            "Params": [
                {"TimeInfo": [{"GMTOffset": "3600", "Timezone": "Europe/Brussels", "IsDST": "False"}]},
                {"SystemInfo": [{"SWversion": "1.10.0.34209", "LastConfig": "20240101T120000"}]}
            ]
        }"#;
        let env = decode(raw).unwrap();
        assert_eq!(
            env.system_info().unwrap().sw_version.as_deref(),
            Some("1.10.0.34209")
        );
        assert_eq!(
            env.time_info().unwrap().timezone.as_deref(),
            Some("Europe/Brussels")
        );
    }
}
