// ── Alarm panels ──

use serde::{Deserialize, Serialize};

use cocolink_api::Property;

use super::{Encoded, property};

/// Panel state that raises the triggered pulse.
const INTRUSION: &str = "Intrusion";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmState {
    /// Raw panel state (`Off`, `PreArmed`, `Armed`, `Detected`, `Intrusion`, ...).
    pub state: Option<String>,
    /// True only in the snapshot where the panel entered intrusion.
    pub triggered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum AlarmCommand {
    Arm,
    Disarm,
}

impl AlarmState {
    pub(crate) fn apply(&mut self, view: &Property) {
        let was_intrusion = self.state.as_deref() == Some(INTRUSION);
        self.triggered = false;
        if let Some(s) = view.state.as_deref() {
            self.triggered = s == INTRUSION && !was_intrusion;
            self.state = Some(s.to_owned());
        }
    }

    pub(crate) fn encode(command: AlarmCommand) -> Encoded {
        vec![vec![property(|p| p.control = Some(command.to_string()))]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(s: &str) -> Property {
        Property {
            state: Some(s.into()),
            ..Property::default()
        }
    }

    #[test]
    fn intrusion_pulses_once() {
        let mut alarm = AlarmState::default();
        alarm.apply(&state("Armed"));
        assert!(!alarm.triggered);

        alarm.apply(&state("Intrusion"));
        assert!(alarm.triggered);

        alarm.apply(&state("Intrusion"));
        assert!(!alarm.triggered);

        alarm.apply(&Property::default());
        assert!(!alarm.triggered);
        assert_eq!(alarm.state.as_deref(), Some("Intrusion"));
    }

    #[test]
    fn arm_and_disarm() {
        assert_eq!(
            AlarmState::encode(AlarmCommand::Arm)[0][0].control.as_deref(),
            Some("Arm")
        );
        assert_eq!(
            AlarmState::encode(AlarmCommand::Disarm)[0][0].control.as_deref(),
            Some("Disarm")
        );
    }
}
