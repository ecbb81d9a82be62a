// ── Video door stations ──

use serde::{Deserialize, Serialize};

use cocolink_api::{Parameter, Property};

use super::{DeviceId, MacAddress};

/// Number of call buttons a station exposes.
pub const BUTTONS: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoState {
    pub mac: Option<MacAddress>,
    pub ip_address: Option<String>,
    pub mjpeg_uri: Option<String>,
    pub thumbnail_uri: Option<String>,
    /// Call status per button (`Idle`, `Ringing`, `Active`, ...).
    pub call_status: [Option<String>; BUTTONS],
    /// Access points linked to each button.
    pub linked: [Option<DeviceId>; BUTTONS],
}

impl VideoState {
    pub(crate) fn from_parameters(params: &Parameter) -> Self {
        Self {
            mac: params.mac_address.as_deref().map(MacAddress::new),
            ip_address: params.ip_address.clone(),
            mjpeg_uri: params.mjpeg_uri.clone(),
            thumbnail_uri: params.tn_uri.clone(),
            ..Self::default()
        }
    }

    /// Buttons whose call status was present in this delta, 1-based.
    pub(crate) fn apply(&mut self, view: &Property) -> Vec<u8> {
        let mut touched = Vec::new();
        for (slot, button) in self.call_status.iter_mut().zip(1u8..) {
            if let Some(status) = view.call_status(button) {
                *slot = Some(status.to_owned());
                touched.push(button);
            }
        }
        touched
    }

    pub fn is_ringing(&self, button: u8) -> bool {
        usize::from(button)
            .checked_sub(1)
            .and_then(|i| self.call_status.get(i))
            .is_some_and(|s| s.as_deref() == Some("Ringing"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_status_per_button() {
        let mut state = VideoState::default();
        let touched = state.apply(&Property {
            call_status01: Some("Idle".into()),
            call_status03: Some("Ringing".into()),
            ..Property::default()
        });
        assert_eq!(touched, vec![1, 3]);
        assert!(state.is_ringing(3));
        assert!(!state.is_ringing(1));
        assert!(!state.is_ringing(0));
        assert!(!state.is_ringing(7));
    }

    #[test]
    fn parameters_populate_metadata() {
        let state = VideoState::from_parameters(&Parameter {
            mac_address: Some("AA-BB-CC-00-11-22".into()),
            ip_address: Some("10.0.0.9".into()),
            ..Parameter::default()
        });
        assert_eq!(state.mac.unwrap().as_str(), "aa:bb:cc:00:11:22");
        assert_eq!(state.ip_address.as_deref(), Some("10.0.0.9"));
        assert!(state.mjpeg_uri.is_none());
    }
}
