//! Live stream of controller events and device changes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;

use cocolink_core::{ControllerEvent, DeviceHandler, DeviceId, DeviceSnapshot};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::{Session, util};

// ── Device handler bridge ───────────────────────────────────────────

pub(crate) enum Change {
    State(DeviceSnapshot),
    Removed(DeviceId),
}

/// Forwards device callbacks into a channel; callbacks run under the
/// device lock, so nothing is printed from here.
pub(crate) struct Forwarder(mpsc::UnboundedSender<Change>);

impl Forwarder {
    pub(crate) fn channel() -> (Arc<dyn DeviceHandler>, mpsc::UnboundedReceiver<Change>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self(tx)), rx)
    }
}

impl DeviceHandler for Forwarder {
    fn state_changed(&self, snapshot: &DeviceSnapshot) {
        let _ = self.0.send(Change::State(snapshot.clone()));
    }

    fn removed(&self, id: &DeviceId) {
        let _ = self.0.send(Change::Removed(id.clone()));
    }
}

// ── Output lines ────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Line<'a> {
    Event {
        at: DateTime<Utc>,
        #[serde(flatten)]
        event: &'a ControllerEvent,
    },
    State {
        at: DateTime<Utc>,
        device: &'a DeviceSnapshot,
    },
    Removed {
        at: DateTime<Utc>,
        id: &'a DeviceId,
    },
}

pub(crate) fn print_change(change: &Change, names: &HashMap<DeviceId, String>, global: &GlobalOpts) {
    let at = Utc::now();
    let line = match change {
        Change::State(device) => Line::State { at, device },
        Change::Removed(id) => Line::Removed { at, id },
    };
    emit(&line, global, || match change {
        Change::State(d) => format!(
            "{} {:<24} {}",
            at.format("%H:%M:%S"),
            d.info.name,
            output::paint_state(&util::summarize(&d.state), output::should_color(&global.color))
        ),
        Change::Removed(id) => format!(
            "{} {:<24} removed",
            at.format("%H:%M:%S"),
            names.get(id).map_or(id.as_str(), String::as_str)
        ),
    });
}

fn print_event(event: &ControllerEvent, global: &GlobalOpts) {
    let at = Utc::now();
    emit(&Line::Event { at, event }, global, || {
        let text = match event {
            ControllerEvent::Online => "controller online".to_owned(),
            ControllerEvent::Offline { reason } => format!("controller offline: {reason}"),
            ControllerEvent::ConfigurationError { reason } => {
                format!("configuration error: {reason}")
            }
            ControllerEvent::Alarm { text } => format!("ALARM: {text}"),
            ControllerEvent::Notice { text } => format!("notice: {text}"),
            ControllerEvent::PropertiesChanged { info } => format!(
                "system info: version {}",
                info.sw_version.as_deref().unwrap_or("-")
            ),
        };
        format!("{} {text}", at.format("%H:%M:%S"))
    });
}

/// Structured formats print one compact JSON object per line.
fn emit(line: &Line<'_>, global: &GlobalOpts, human: impl FnOnce() -> String) {
    let rendered = match global.output {
        OutputFormat::Table | OutputFormat::Plain => human(),
        OutputFormat::Json | OutputFormat::JsonCompact | OutputFormat::Yaml => {
            match output::render_json(line, true) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping unrenderable watch line");
                    return;
                }
            }
        }
    };
    output::print_output(&rendered, global.quiet);
}

/// Resolves on Ctrl-C or after `secs`.
pub(crate) async fn stop_signal(secs: Option<u64>) {
    let deadline = async {
        match secs {
            Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        () = deadline => {}
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(session: &Session, args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let controller = &session.controller;
    let mut events = session.events.stream();
    let (forwarder, mut changes) = Forwarder::channel();

    let mut names = HashMap::new();
    for device in controller.devices() {
        controller.register_handler(device.info.id(), Arc::downgrade(&forwarder))?;
        names.insert(device.info.id().clone(), device.info.name.clone());
    }
    if !global.quiet {
        eprintln!("Watching {} devices, Ctrl-C to stop", names.len());
    }

    let stop = stop_signal(args.secs);
    tokio::pin!(stop);
    loop {
        tokio::select! {
            () = &mut stop => break,
            Some(change) = changes.recv() => print_change(&change, &names, global),
            Some(event) = events.next() => match event {
                Ok(event) => print_event(&event, global),
                Err(e) => tracing::warn!(error = %e, "Event stream lagged"),
            },
        }
    }
    Ok(())
}
