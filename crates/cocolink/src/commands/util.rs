//! Shared helpers for command handlers.

use cocolink_core::{Controller, DeviceId, DeviceState, MqttTransport};

use crate::error::CliError;

/// Resolve a device UUID or (case-insensitive) name to its id.
pub fn resolve_device(
    controller: &Controller<MqttTransport>,
    identifier: &str,
) -> Result<DeviceId, CliError> {
    let devices = controller.devices();
    if let Some(d) = devices.iter().find(|d| d.info.id().as_str() == identifier) {
        return Ok(d.info.id().clone());
    }

    let mut named = devices
        .iter()
        .filter(|d| d.info.name.eq_ignore_ascii_case(identifier));
    match (named.next(), named.next()) {
        (Some(d), None) => Ok(d.info.id().clone()),
        (Some(_), Some(_)) => Err(CliError::Ambiguous {
            identifier: identifier.into(),
        }),
        (None, _) => Err(CliError::NotFound {
            identifier: identifier.into(),
        }),
    }
}

/// Tenths of a degree as `21.5`.
pub fn degrees(tenths: i32) -> String {
    let sign = if tenths < 0 { "-" } else { "" };
    let abs = tenths.unsigned_abs();
    format!("{sign}{}.{}", abs / 10, abs % 10)
}

/// One-line summary of a device state for tables and watch output.
pub fn summarize(state: &DeviceState) -> String {
    match state {
        DeviceState::Action(a) => {
            let power = if a.on { "on" } else { "off" };
            if a.moving {
                format!("moving, {}%", a.level)
            } else if a.level > 0 {
                format!("{power}, {}%", a.level)
            } else {
                power.to_owned()
            }
        }
        DeviceState::Thermostat(t) => {
            let mut parts = Vec::new();
            if let Some(m) = t.measured {
                parts.push(format!("{}°C", degrees(m)));
            }
            if let Some(mode) = t.mode {
                parts.push(mode.to_string());
            }
            if t.overrule_active {
                parts.push(format!(
                    "overrule {}°C for {}m",
                    degrees(t.overrule),
                    t.overrule_minutes
                ));
            } else if let Some(s) = t.setpoint {
                parts.push(format!("setpoint {}°C", degrees(s)));
            }
            parts.join(", ")
        }
        DeviceState::Meter(m) => {
            let mut parts = Vec::new();
            if let Some(p) = m.power {
                parts.push(format!("{p} W"));
            }
            if let Some(r) = m.reading {
                parts.push(format!("total {r}"));
            }
            parts.join(", ")
        }
        DeviceState::Access(a) => {
            let lock = if a.door_locked { "closed" } else { "open" };
            if a.bell {
                format!("{lock}, ringing")
            } else {
                lock.to_owned()
            }
        }
        DeviceState::Video(v) => v
            .call_status
            .iter()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join("/"),
        DeviceState::Alarm(a) => a.state.clone().unwrap_or_else(|| "-".into()),
    }
}
