// ── Access control ──
//
// Door entry points. A bell button may belong to a video door station,
// identified by a `ButtonId` parameter of the form `<mac>_<button>`; the
// registry links the two once both have been seen.

use serde::{Deserialize, Serialize};

use cocolink_api::Property;

use super::{DeviceId, Encoded, InvalidValue, MacAddress, property};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AccessKind {
    Base,
    BellButton,
    RingAndComeIn,
}

/// Companion video door station button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoLink {
    pub mac: MacAddress,
    /// 1-based button index on the station.
    pub button: u8,
    /// Set once the station itself is registered.
    pub video: Option<DeviceId>,
}

impl VideoLink {
    /// Parse a `ButtonId` parameter such as `00:11:22:33:44:55_1`.
    pub fn parse(button_id: &str) -> Option<Self> {
        let (mac, index) = button_id.rsplit_once('_')?;
        let button: u8 = index.trim().parse().ok()?;
        if mac.is_empty() || !(1..=4).contains(&button) {
            return None;
        }
        Some(Self {
            mac: MacAddress::new(mac),
            button,
            video: None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessState {
    pub bell: bool,
    pub ring_and_come_in: bool,
    pub door_locked: bool,
    pub video: Option<VideoLink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessCommand {
    Unlock,
    Bell,
    RingAndComeIn(bool),
}

impl AccessState {
    pub(crate) fn apply(&mut self, kind: AccessKind, view: &Property) {
        if let Some(s) = view.basic_state.as_deref() {
            let on = matches!(s, "On" | "Triggered");
            match kind {
                AccessKind::RingAndComeIn => self.ring_and_come_in = on,
                AccessKind::Base | AccessKind::BellButton => self.bell = on,
            }
        }
        match view.doorlock_state.as_deref() {
            Some("Open") => self.door_locked = false,
            Some("Closed") => self.door_locked = true,
            _ => {}
        }
    }

    pub(crate) fn encode(kind: AccessKind, command: AccessCommand) -> Result<Encoded, InvalidValue> {
        let props = match (kind, command) {
            (_, AccessCommand::Unlock) => property(|p| p.doorlock_state = Some("Open".into())),
            (AccessKind::BellButton | AccessKind::RingAndComeIn, AccessCommand::Bell) => {
                property(|p| p.basic_state = Some("Triggered".into()))
            }
            (AccessKind::RingAndComeIn, AccessCommand::RingAndComeIn(on)) => {
                let value = if on { "On" } else { "Off" };
                property(|p| p.basic_state = Some(value.into()))
            }
            (kind, command) => {
                return Err(InvalidValue(format!(
                    "{command:?} is not supported by a {kind} access point"
                )));
            }
        };
        Ok(vec![vec![props]])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn button_id_parses_mac_and_index() {
        let link = VideoLink::parse("00-11-22-33-44-55_2").unwrap();
        assert_eq!(link.mac.as_str(), "00:11:22:33:44:55");
        assert_eq!(link.button, 2);
        assert!(link.video.is_none());
    }

    #[test]
    fn button_id_rejects_garbage() {
        assert!(VideoLink::parse("no-index").is_none());
        assert!(VideoLink::parse("_1").is_none());
        assert!(VideoLink::parse("00:11:22:33:44:55_9").is_none());
    }

    #[test]
    fn basic_state_targets_kind_field() {
        let on = Property {
            basic_state: Some("On".into()),
            ..Property::default()
        };

        let mut ring = AccessState::default();
        ring.apply(AccessKind::RingAndComeIn, &on);
        assert!(ring.ring_and_come_in);
        assert!(!ring.bell);

        let mut bell = AccessState::default();
        bell.apply(AccessKind::BellButton, &on);
        assert!(bell.bell);
        assert!(!bell.ring_and_come_in);
    }

    #[test]
    fn doorlock_state() {
        let mut state = AccessState::default();
        state.apply(
            AccessKind::Base,
            &Property {
                doorlock_state: Some("Closed".into()),
                ..Property::default()
            },
        );
        assert!(state.door_locked);
    }

    #[test]
    fn command_domains() {
        assert!(AccessState::encode(AccessKind::Base, AccessCommand::Unlock).is_ok());
        assert!(AccessState::encode(AccessKind::Base, AccessCommand::Bell).is_err());
        assert!(AccessState::encode(AccessKind::BellButton, AccessCommand::RingAndComeIn(true)).is_err());

        let encoded =
            AccessState::encode(AccessKind::RingAndComeIn, AccessCommand::RingAndComeIn(false))
                .unwrap();
        assert_eq!(encoded[0][0].basic_state.as_deref(), Some("Off"));
    }
}
