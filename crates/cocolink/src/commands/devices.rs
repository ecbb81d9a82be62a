//! Device listing.

use tabled::Tabled;

use cocolink_core::DeviceSnapshot;

use crate::cli::{DevicesArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::{Session, util};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "State")]
    state: String,
}

impl DeviceRow {
    fn new(d: &DeviceSnapshot, color: bool) -> Self {
        Self {
            id: d.info.id().to_string(),
            name: d.info.name.clone(),
            location: d.info.location.clone().unwrap_or_default(),
            category: d.info.category().to_string(),
            state: output::paint_state(&util::summarize(&d.state), color),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(session: &Session, args: &DevicesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut devices = session.controller.devices();
    if let Some(ref prefix) = args.category {
        let prefix = prefix.to_ascii_lowercase();
        devices.retain(|d| d.info.category().to_string().starts_with(&prefix));
    }

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &devices,
        |d| DeviceRow::new(d, color),
        |d| d.info.id().to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
