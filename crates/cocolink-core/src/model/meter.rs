// ── Energy meters ──
//
// Live power is only reported while a subscription is active: the
// controller streams `ElectricalPower` for about 30 s after each
// `ReportInstantUsage=True`. Cumulative readings arrive independently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cocolink_api::Property;

use super::{Encoded, parse_int, property};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum MeterKind {
    LiveEnergy,
    Energy,
    Gas,
    Water,
}

impl MeterKind {
    pub fn supports_live(self) -> bool {
        matches!(self, Self::LiveEnergy)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterState {
    /// Instantaneous power in W.
    pub power: Option<i64>,
    /// Cumulative reading in the meter's unit (kWh, m³).
    pub reading: Option<f64>,
    /// Reading accumulated today.
    pub day_reading: Option<f64>,
    pub last_reading: Option<DateTime<Utc>>,
}

impl MeterState {
    pub(crate) fn apply(&mut self, view: &Property, now: DateTime<Utc>) {
        if let Some(p) = parse_int(view.electrical_power.as_deref()) {
            self.power = Some(p);
        }

        let total = parse_decimal(view.total_reading.as_deref());
        let day = parse_decimal(view.day_reading.as_deref());
        if total.is_some() || day.is_some() {
            if total.is_some() {
                self.reading = total;
            }
            if day.is_some() {
                self.day_reading = day;
            }
            self.last_reading = Some(now);
        }
    }

    pub(crate) fn encode_live(enable: bool) -> Encoded {
        let value = if enable { "True" } else { "False" };
        vec![vec![property(|p| {
            p.report_instant_usage = Some(value.to_owned());
        })]]
    }
}

fn parse_decimal(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse().ok().filter(|v: &f64| v.is_finite())
}
