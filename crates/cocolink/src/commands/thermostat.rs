//! Thermostat commands.

use crate::cli::{GlobalOpts, ThermostatArgs, ThermostatCommand};
use crate::error::CliError;

use super::{Session, util};

/// Degrees to tenths, rejecting values no thermostat accepts.
#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn to_tenths(celsius: f64) -> Result<i32, CliError> {
    if !celsius.is_finite() || !(-50.0..=100.0).contains(&celsius) {
        return Err(CliError::Validation {
            field: "setpoint".into(),
            reason: format!("{celsius} is not a usable temperature"),
        });
    }
    Ok((celsius * 10.0).round() as i32)
}

pub async fn handle(
    session: &Session,
    args: ThermostatArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let controller = &session.controller;
    let message = match args.command {
        ThermostatCommand::Mode { device, mode } => {
            let id = util::resolve_device(controller, &device)?;
            controller.execute_thermostat_mode(&id, mode).await?;
            format!("{id} set to {mode}")
        }
        ThermostatCommand::Overrule {
            device,
            setpoint,
            minutes,
        } => {
            let id = util::resolve_device(controller, &device)?;
            let tenths = to_tenths(setpoint)?;
            controller
                .execute_thermostat_overrule(&id, tenths, minutes)
                .await?;
            match minutes {
                Some(m) if m <= 0 => format!("Overrule cleared on {id}"),
                _ => format!("{id} overruled to {}°C", util::degrees(tenths)),
            }
        }
    };
    if !global.quiet {
        eprintln!("{message}");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn converts_degrees() {
        assert_eq!(to_tenths(21.5).unwrap(), 215);
        assert_eq!(to_tenths(-0.25).unwrap(), -3);
        assert!(to_tenths(f64::NAN).is_err());
        assert!(to_tenths(250.0).is_err());
    }
}
