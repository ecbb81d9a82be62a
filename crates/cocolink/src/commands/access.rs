//! Door access commands.

use crate::cli::{AccessArgs, AccessCommand, GlobalOpts, Toggle};
use crate::error::CliError;

use super::{Session, util};

pub async fn handle(session: &Session, args: AccessArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let controller = &session.controller;
    let message = match args.command {
        AccessCommand::Unlock { device } => {
            let id = util::resolve_device(controller, &device)?;
            controller.execute_access_unlock(&id).await?;
            format!("Unlocking {id}")
        }
        AccessCommand::Bell { device } => {
            let id = util::resolve_device(controller, &device)?;
            controller.execute_access_bell(&id).await?;
            format!("Ringing {id}")
        }
        AccessCommand::RingAndComeIn { device, state } => {
            let id = util::resolve_device(controller, &device)?;
            let enable = matches!(state, Toggle::On);
            controller.execute_access_ring_and_come_in(&id, enable).await?;
            format!(
                "Ring-and-come-in {} on {id}",
                if enable { "enabled" } else { "disabled" }
            )
        }
    };
    if !global.quiet {
        eprintln!("{message}");
    }
    Ok(())
}
