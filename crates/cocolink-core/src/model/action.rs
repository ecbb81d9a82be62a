// ── Action devices ──
//
// Triggers, relays, dimmers and roller shutters. The platform speaks
// "percent closed" for shutters while the controller reports "percent
// open", so positions are mirrored unless the device is marked inverted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use cocolink_api::Property;

use super::{Encoded, InvalidValue, parse_int, property};

/// Action sub-kind, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ActionKind {
    Trigger,
    Relay,
    Dimmer,
    RollerShutter,
}

/// Live state of an action device.
///
/// `level` is the brightness for dimmers (the last non-zero value, kept
/// while the light is off) and the percent-closed position for shutters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionState {
    pub on: bool,
    pub level: u8,
    pub moving: bool,
    pub inverted: bool,
}

/// Commands accepted by action devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionCommand {
    On,
    Off,
    Trigger,
    Stop,
    Up,
    Down,
    /// Dimmer brightness or shutter percent-closed, 0..=100.
    Level(u8),
}

impl fmt::Display for ActionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
            Self::Trigger => f.write_str("trigger"),
            Self::Stop => f.write_str("stop"),
            Self::Up => f.write_str("up"),
            Self::Down => f.write_str("down"),
            Self::Level(v) => write!(f, "{v}"),
        }
    }
}

impl FromStr for ActionCommand {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            "trigger" | "triggered" => Ok(Self::Trigger),
            "stop" => Ok(Self::Stop),
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            other => other
                .parse::<u8>()
                .ok()
                .filter(|v| *v <= 100)
                .map(Self::Level)
                .ok_or_else(|| InvalidValue(format!("unrecognised action value '{s}'"))),
        }
    }
}

/// Map between platform percent-closed and wire position. Self-inverse.
pub fn shutter_position(value: u8, inverted: bool) -> u8 {
    let value = value.min(100);
    if inverted { value } else { 100 - value }
}

impl ActionState {
    pub(crate) fn apply(&mut self, kind: ActionKind, view: &Property) {
        match kind {
            ActionKind::Trigger | ActionKind::Relay | ActionKind::Dimmer => {
                // Status is authoritative when both are present.
                if let Some(s) = view.status.as_deref().or(view.basic_state.as_deref()) {
                    self.on = matches!(s, "On" | "Triggered" | "True");
                }
                if kind == ActionKind::Dimmer {
                    if let Some(b) = parse_int(view.brightness.as_deref()) {
                        if b <= 0 {
                            self.on = false;
                        } else {
                            self.level = clamp_percent(b);
                        }
                    }
                }
            }
            ActionKind::RollerShutter => {
                if let Some(m) = view.moving.as_deref() {
                    self.moving = m == "True";
                }
                let moving_now = view.moving.as_deref() == Some("True");
                if !moving_now {
                    if let Some(p) = parse_int(view.position.as_deref()) {
                        self.level = shutter_position(clamp_percent(p), self.inverted);
                    }
                }
            }
        }
    }

    pub(crate) fn encode(&self, kind: ActionKind, command: ActionCommand) -> Result<Encoded, InvalidValue> {
        let message = |props: Vec<Property>| -> Result<Encoded, InvalidValue> { Ok(vec![props]) };
        match (kind, command) {
            (ActionKind::Trigger, ActionCommand::Trigger | ActionCommand::On) => {
                message(vec![property(|p| p.basic_state = Some("Triggered".into()))])
            }
            (ActionKind::Relay, ActionCommand::On) => message(vec![status("On")]),
            (ActionKind::Relay, ActionCommand::Off) => message(vec![status("Off")]),

            (ActionKind::Dimmer, ActionCommand::On) => {
                let mut props = vec![status("On")];
                if self.level > 0 {
                    props.push(brightness(self.level));
                }
                message(props)
            }
            (ActionKind::Dimmer, ActionCommand::Off | ActionCommand::Level(0)) => {
                message(vec![status("Off")])
            }
            (ActionKind::Dimmer, ActionCommand::Level(v)) if v <= 100 => {
                if self.on {
                    message(vec![brightness(v)])
                } else {
                    // The controller has no compound command: on first, then the level.
                    Ok(vec![vec![status("On")], vec![brightness(v)]])
                }
            }

            (ActionKind::RollerShutter, ActionCommand::Stop) => {
                message(vec![property(|p| p.action = Some("Stop".into()))])
            }
            (ActionKind::RollerShutter, ActionCommand::Up) => message(vec![position(100)]),
            (ActionKind::RollerShutter, ActionCommand::Down) => message(vec![position(0)]),
            (ActionKind::RollerShutter, ActionCommand::Level(v)) if v <= 100 => {
                message(vec![position(shutter_position(v, self.inverted))])
            }

            (kind, command) => Err(InvalidValue(format!(
                "'{command}' is not supported by a {kind} action"
            ))),
        }
    }
}

fn clamp_percent(value: i64) -> u8 {
    u8::try_from(value.clamp(0, 100)).unwrap_or(100)
}

fn status(value: &str) -> Property {
    property(|p| p.status = Some(value.to_owned()))
}

fn brightness(value: u8) -> Property {
    property(|p| p.brightness = Some(value.to_string()))
}

fn position(value: u8) -> Property {
    property(|p| p.position = Some(value.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn view(f: impl FnOnce(&mut Property)) -> Property {
        property(f)
    }

    #[test]
    fn status_wins_over_basic_state() {
        let mut state = ActionState::default();
        state.apply(
            ActionKind::Relay,
            &view(|p| {
                p.status = Some("On".into());
                p.basic_state = Some("Off".into());
            }),
        );
        assert!(state.on);
    }

    #[test]
    fn basic_state_used_when_status_absent() {
        let mut state = ActionState::default();
        state.apply(ActionKind::Trigger, &view(|p| p.basic_state = Some("Triggered".into())));
        assert!(state.on);
    }

    #[test]
    fn brightness_zero_is_off_and_keeps_cached_level() {
        let mut state = ActionState::default();
        state.apply(
            ActionKind::Dimmer,
            &view(|p| {
                p.status = Some("On".into());
                p.brightness = Some("70".into());
            }),
        );
        assert_eq!((state.on, state.level), (true, 70));

        state.apply(ActionKind::Dimmer, &view(|p| p.brightness = Some("0".into())));
        assert_eq!((state.on, state.level), (false, 70));
    }

    #[test]
    fn dimmer_on_restores_cached_brightness() {
        let state = ActionState {
            on: false,
            level: 35,
            ..ActionState::default()
        };
        let encoded = state.encode(ActionKind::Dimmer, ActionCommand::On).unwrap();
        assert_eq!(encoded, vec![vec![status("On"), brightness(35)]]);
    }

    #[test]
    fn dimmer_zero_equals_off() {
        let state = ActionState {
            on: true,
            level: 50,
            ..ActionState::default()
        };
        let off = state.encode(ActionKind::Dimmer, ActionCommand::Off).unwrap();
        let zero = state.encode(ActionKind::Dimmer, ActionCommand::Level(0)).unwrap();
        assert_eq!(off, zero);
        assert_eq!(off, vec![vec![status("Off")]]);
    }

    #[test]
    fn dimmer_level_while_off_sends_two_messages() {
        let state = ActionState::default();
        let encoded = state.encode(ActionKind::Dimmer, ActionCommand::Level(40)).unwrap();
        assert_eq!(encoded, vec![vec![status("On")], vec![brightness(40)]]);

        let lit = ActionState {
            on: true,
            level: 10,
            ..ActionState::default()
        };
        let encoded = lit.encode(ActionKind::Dimmer, ActionCommand::Level(40)).unwrap();
        assert_eq!(encoded, vec![vec![brightness(40)]]);
    }

    #[test]
    fn shutter_position_round_trips() {
        for inverted in [false, true] {
            for p in 0..=100u8 {
                let mut state = ActionState {
                    inverted,
                    ..ActionState::default()
                };
                let encoded = state
                    .encode(ActionKind::RollerShutter, ActionCommand::Level(p))
                    .unwrap();
                let wire = encoded[0][0].clone();
                state.apply(ActionKind::RollerShutter, &wire);
                assert_eq!(state.level, p, "inverted={inverted}");
            }
        }
    }

    #[test]
    fn shutter_position_ignored_while_moving() {
        let mut state = ActionState::default();
        state.apply(
            ActionKind::RollerShutter,
            &view(|p| {
                p.moving = Some("True".into());
                p.position = Some("20".into());
            }),
        );
        assert!(state.moving);
        assert_eq!(state.level, 0);

        state.apply(
            ActionKind::RollerShutter,
            &view(|p| {
                p.moving = Some("False".into());
                p.position = Some("20".into());
            }),
        );
        assert!(!state.moving);
        assert_eq!(state.level, 80);
    }

    #[test]
    fn shutter_commands() {
        let state = ActionState::default();
        assert_eq!(
            state.encode(ActionKind::RollerShutter, ActionCommand::Up).unwrap(),
            vec![vec![position(100)]]
        );
        assert_eq!(
            state.encode(ActionKind::RollerShutter, ActionCommand::Down).unwrap(),
            vec![vec![position(0)]]
        );
        let stop = state.encode(ActionKind::RollerShutter, ActionCommand::Stop).unwrap();
        assert_eq!(stop[0][0].action.as_deref(), Some("Stop"));
    }

    #[test]
    fn unsupported_command_is_invalid() {
        let state = ActionState::default();
        assert!(state.encode(ActionKind::Relay, ActionCommand::Level(30)).is_err());
        assert!(state.encode(ActionKind::Trigger, ActionCommand::Off).is_err());
        assert!(state.encode(ActionKind::Dimmer, ActionCommand::Level(101)).is_err());
    }

    #[test]
    fn parse_action_values() {
        assert_eq!("On".parse::<ActionCommand>().unwrap(), ActionCommand::On);
        assert_eq!("stop".parse::<ActionCommand>().unwrap(), ActionCommand::Stop);
        assert_eq!("55".parse::<ActionCommand>().unwrap(), ActionCommand::Level(55));
        assert!("150".parse::<ActionCommand>().is_err());
        assert!("dim".parse::<ActionCommand>().is_err());
    }
}
