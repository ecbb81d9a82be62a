//! Alarm panel commands.

use crate::cli::{AlarmArgs, AlarmCommand, GlobalOpts};
use crate::error::CliError;

use super::{Session, util};

pub async fn handle(session: &Session, args: AlarmArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let controller = &session.controller;
    let message = match args.command {
        AlarmCommand::Arm { device } => {
            let id = util::resolve_device(controller, &device)?;
            controller.execute_alarm_arm(&id).await?;
            format!("Arming {id}")
        }
        AlarmCommand::Disarm { device } => {
            let id = util::resolve_device(controller, &device)?;
            controller.execute_alarm_disarm(&id).await?;
            format!("Disarming {id}")
        }
    };
    if !global.quiet {
        eprintln!("{message}");
    }
    Ok(())
}
