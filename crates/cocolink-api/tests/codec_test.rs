#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;

use cocolink_api::codec::{Envelope, method};
use cocolink_api::{Topic, decode, encode};

// ── Helpers ──────────────────────────────────────────────────────────

const DEVICES_LIST_RSP: &str = r#"{
  "Method": "devices.list",
  "Params": [{
    "Devices": [
      {
        "Uuid": "0b7f-light",
        "Name": "Kitchen spots",
        "Type": "action",
        "Technology": "nikohomecontrol",
        "Model": "dimmer",
        "Identifier": "f00d",
        "Online": "True",
        "Properties": [{"Status": "On"}, {"Brightness": "65"}],
        "Parameters": [{"LocationName": "Kitchen"}]
      },
      {
        "Uuid": "1c2d-thermo",
        "Name": "Living",
        "Type": "thermostat",
        "Technology": "nikohomecontrol",
        "Model": "thermostat",
        "Properties": [
          {"AmbientTemperature": "20.5"},
          {"SetpointTemperature": "21.0"},
          {"Program": "Day"},
          {"OverruleActive": "False"},
          {"EcoSave": "False"},
          {"Demand": "Heating"}
        ],
        "Parameters": [{"LocationName": "Living room"}]
      },
      {
        "Uuid": "9a8b-video",
        "Name": "Front door",
        "Type": "action",
        "Model": "videodoorstation",
        "Properties": [{"CallStatus01": "Idle"}],
        "Parameters": [
          {"MacAddress": "00:11:22:33:44:55"},
          {"IpAddress": "192.168.1.50"},
          {"MjpegUri": "http://192.168.1.50/mjpeg"}
        ]
      }
    ]
  }]
}"#;

// ── Tests ────────────────────────────────────────────────────────────

#[test]
fn devices_list_response_decodes_every_device() {
    let env = decode(DEVICES_LIST_RSP.as_bytes()).unwrap();
    assert_eq!(env.method, method::DEVICES_LIST);

    let ids: Vec<_> = env.devices().filter_map(|d| d.uuid.as_deref()).collect();
    assert_eq!(ids, vec!["0b7f-light", "1c2d-thermo", "9a8b-video"]);

    let thermo = env.devices().nth(1).unwrap();
    let view = thermo.property_view();
    assert_eq!(view.ambient_temperature.as_deref(), Some("20.5"));
    assert_eq!(view.demand.as_deref(), Some("Heating"));
    assert_eq!(
        thermo.parameter_view().location_name.as_deref(),
        Some("Living room")
    );

    let video = env.devices().nth(2).unwrap().parameter_view();
    assert_eq!(video.mac_address.as_deref(), Some("00:11:22:33:44:55"));
    assert_eq!(video.tn_uri, None);
}

#[test]
fn decoded_envelope_reencodes_to_equivalent_json() {
    let env = decode(DEVICES_LIST_RSP.as_bytes()).unwrap();
    let bytes = encode(&env).unwrap();

    let original: serde_json::Value = serde_json::from_str(DEVICES_LIST_RSP).unwrap();
    let reencoded: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(original, reencoded);
}

#[test]
fn notification_event_routes_and_decodes() {
    let topic = Topic::classify("hobby", "hobby/notification/evt");
    assert_eq!(topic, Topic::NotificationEvent);

    let env = decode(
        br#"{"Method":"notifications.raised","Params":[{"Notifications":[
            {"Uuid":"n1","Type":"alarm","Text":"Smoke detected","Status":"new","Time":"20240101T101010"}
        ]}]}"#,
    )
    .unwrap();
    let n = env.notifications().next().unwrap();
    assert_eq!(n.kind.as_deref(), Some("alarm"));
    assert_eq!(n.text.as_deref(), Some("Smoke detected"));
}

#[test]
fn handshake_requests_are_bare() {
    for m in [
        method::SYSTEMINFO_PUBLISH,
        method::SERVICES_LIST,
        method::DEVICES_LIST,
        method::NOTIFICATIONS_LIST,
    ] {
        let json: serde_json::Value =
            serde_json::from_slice(&encode(&Envelope::request(m)).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({ "Method": m }));
    }
}
