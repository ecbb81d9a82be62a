//! Energy meter commands.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cli::{GlobalOpts, MeterArgs, MeterCommand};
use crate::error::CliError;

use super::watch::{Forwarder, print_change, stop_signal};
use super::{Session, util};

pub async fn handle(session: &Session, args: MeterArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        MeterCommand::Live { device, secs } => {
            let controller = &session.controller;
            let id = util::resolve_device(controller, &device)?;
            let (forwarder, mut changes) = Forwarder::channel();
            controller.register_handler(&id, Arc::downgrade(&forwarder))?;

            controller.execute_meter_live_start(&id).await?;
            if !global.quiet {
                eprintln!("Following live power of {id} for {secs}s");
            }

            let names = HashMap::new();
            let stop = stop_signal(Some(secs));
            tokio::pin!(stop);
            loop {
                tokio::select! {
                    () = &mut stop => break,
                    Some(change) = changes.recv() => print_change(&change, &names, global),
                }
            }

            controller.unregister_handler(&id);
            controller.execute_meter_live_stop(&id).await?;
            Ok(())
        }
    }
}
