// ── Thermostats ──
//
// Temperatures are carried in tenths of a degree Celsius. An overrule is
// a timed override of the scheduled program's setpoint.

use serde::{Deserialize, Serialize};

use cocolink_api::Property;

use super::{Encoded, InvalidValue, parse_int, property};

/// Allowed overrule setpoint range, in tenths of a degree.
pub const SETPOINT_RANGE: std::ops::RangeInclusive<i32> = 0..=400;

/// Thermostat program, as named on the wire.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum ThermostatMode {
    Day,
    Night,
    Eco,
    Off,
    Cool,
    Prog1,
    Prog2,
    Prog3,
}

/// Heating/cooling demand reported by the thermostat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
pub enum Demand {
    #[default]
    None,
    Heating,
    Cooling,
}

impl Demand {
    /// Numeric convention used by platforms: heating 1, cooling -1, idle 0.
    pub fn as_i8(self) -> i8 {
        match self {
            Self::None => 0,
            Self::Heating => 1,
            Self::Cooling => -1,
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "None" => Some(Self::None),
            "Heating" => Some(Self::Heating),
            "Cooling" => Some(Self::Cooling),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThermostatState {
    /// Measured temperature, tenths of °C.
    pub measured: Option<i32>,
    /// Scheduled setpoint, tenths of °C.
    pub setpoint: Option<i32>,
    pub mode: Option<ThermostatMode>,
    pub overrule_active: bool,
    /// Overrule setpoint, tenths of °C. Zero when no overrule is active.
    pub overrule: i32,
    /// Remaining overrule time in minutes.
    pub overrule_minutes: i32,
    pub eco_save: bool,
    pub demand: Demand,
}

impl ThermostatState {
    pub(crate) fn apply(&mut self, view: &Property) {
        if let Some(t) = tenths(view.ambient_temperature.as_deref()) {
            self.measured = Some(t);
        }
        if let Some(t) = tenths(view.setpoint_temperature.as_deref()) {
            self.setpoint = Some(t);
        }
        if let Some(mode) = view.program.as_deref().and_then(|p| p.parse().ok()) {
            self.mode = Some(mode);
        }

        if let Some(active) = view.overrule_active.as_deref() {
            self.overrule_active = active == "True";
            if !self.overrule_active {
                self.overrule = 0;
                self.overrule_minutes = 0;
            }
        }
        if self.overrule_active {
            if let Some(t) = tenths(view.overrule_setpoint.as_deref()) {
                self.overrule = t;
            }
            if let Some(m) = parse_int(view.overrule_time.as_deref()) {
                self.overrule_minutes = i32::try_from(m).unwrap_or(i32::MAX);
            }
        }

        if let Some(eco) = view.eco_save.as_deref() {
            self.eco_save = eco == "True";
        }
        if let Some(demand) = view
            .demand
            .as_deref()
            .or(view.operation_mode.as_deref())
            .and_then(Demand::parse)
        {
            self.demand = demand;
        }
    }

    pub(crate) fn encode_mode(mode: ThermostatMode) -> Encoded {
        vec![vec![
            property(|p| p.overrule_active = Some("False".into())),
            property(|p| p.program = Some(mode.to_string())),
        ]]
    }

    /// Overrule the schedule. `minutes` of `None` uses `default_minutes`;
    /// zero or negative clears the overrule.
    pub(crate) fn encode_overrule(
        setpoint: i32,
        minutes: Option<i32>,
        default_minutes: i32,
    ) -> Result<Encoded, InvalidValue> {
        let minutes = minutes.unwrap_or(default_minutes);
        if minutes <= 0 {
            return Ok(vec![vec![property(|p| {
                p.overrule_active = Some("False".into());
            })]]);
        }
        if !SETPOINT_RANGE.contains(&setpoint) {
            return Err(InvalidValue(format!(
                "setpoint {setpoint} outside {}..={} tenths of a degree",
                SETPOINT_RANGE.start(),
                SETPOINT_RANGE.end()
            )));
        }

        Ok(vec![vec![
            property(|p| p.overrule_active = Some("True".into())),
            property(|p| p.overrule_setpoint = Some(format_tenths(setpoint))),
            property(|p| p.overrule_time = Some(minutes.to_string())),
        ]])
    }
}

/// Parse a decimal degree string into tenths, rounding half away from zero.
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn tenths(raw: Option<&str>) -> Option<i32> {
    let value: f64 = raw?.trim().parse().ok()?;
    let scaled = (value * 10.0).round();
    if scaled.is_finite() && scaled.abs() < f64::from(i32::MAX) {
        Some(scaled as i32)
    } else {
        None
    }
}

fn format_tenths(value: i32) -> String {
    format!("{:.1}", f64::from(value) / 10.0)
}
