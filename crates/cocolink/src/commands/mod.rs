//! Command dispatch: connects once, runs the handler, then shuts down.

pub mod access;
pub mod action;
pub mod alarm;
pub mod config_cmd;
pub mod devices;
pub mod info;
pub mod meter;
pub mod thermostat;
pub mod util;
pub mod watch;

use std::sync::Arc;

use cocolink_core::{BroadcastEvents, Controller, ControllerConfig, MqttTransport};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// A live controller session for the duration of one command.
pub struct Session {
    pub controller: Controller<MqttTransport>,
    pub events: BroadcastEvents,
}

impl Session {
    /// Connect and wait for the device list.
    pub async fn connect(config: ControllerConfig) -> Result<Self, CliError> {
        let events = BroadcastEvents::default();
        let timeout = config.active_timeout;
        let transport = MqttTransport::new(config.stop_timeout);
        let controller = Controller::new(config, transport, Arc::new(events.clone()));

        controller.start_communication().await?;
        if !controller.communication_active().await {
            controller.shutdown().await;
            return Err(CliError::Timeout {
                seconds: timeout.as_secs(),
            });
        }
        Ok(Self { controller, events })
    }

    pub async fn close(self) {
        self.controller.shutdown().await;
    }
}

/// Dispatch a controller-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    config: ControllerConfig,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let session = Session::connect(config).await?;
    let result = match cmd {
        Command::Devices(args) => devices::handle(&session, &args, global),
        Command::Watch(args) => watch::handle(&session, &args, global).await,
        Command::Action(args) => action::handle(&session, &args, global).await,
        Command::Thermostat(args) => thermostat::handle(&session, args, global).await,
        Command::Meter(args) => meter::handle(&session, args, global).await,
        Command::Access(args) => access::handle(&session, args, global).await,
        Command::Alarm(args) => alarm::handle(&session, args, global).await,
        Command::Info => info::handle(&session, global),
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    };
    session.close().await;
    result
}
