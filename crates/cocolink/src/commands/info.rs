//! Controller system information.

use serde::Serialize;

use cocolink_core::MqttTransport;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::Session;

#[derive(Serialize)]
struct Info {
    host: String,
    profile: String,
    devices: usize,
    software_version: Option<String>,
    last_config: Option<String>,
    language: Option<String>,
    currency: Option<String>,
    timezone: Option<String>,
    utc_offset: Option<String>,
    services: Vec<String>,
}

impl Info {
    fn collect(controller: &cocolink_core::Controller<MqttTransport>) -> Self {
        let system = controller.system_info();
        let time = controller.time_info();
        let system = system.as_deref();
        let time = time.as_deref();
        Self {
            host: controller.config().host.clone(),
            profile: controller.config().profile.clone(),
            devices: controller.devices().len(),
            software_version: system.and_then(|s| s.sw_version.clone()),
            last_config: system.and_then(|s| s.last_config.clone()),
            language: system.and_then(|s| s.language.clone()),
            currency: system.and_then(|s| s.currency.clone()),
            timezone: time.and_then(|t| t.timezone.clone()),
            utc_offset: time.and_then(|t| t.gmt_offset.clone()),
            services: controller
                .services()
                .iter()
                .map(|s| s.name.clone())
                .collect(),
        }
    }
}

fn detail(info: &Info) -> String {
    let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".into());
    [
        format!("Host:        {}", info.host),
        format!("Profile:     {}", info.profile),
        format!("Devices:     {}", info.devices),
        format!("Software:    {}", or_dash(&info.software_version)),
        format!("Last config: {}", or_dash(&info.last_config)),
        format!("Language:    {}", or_dash(&info.language)),
        format!("Currency:    {}", or_dash(&info.currency)),
        format!("Timezone:    {}", or_dash(&info.timezone)),
        format!("UTC offset:  {}", or_dash(&info.utc_offset)),
        format!("Services:    {}", info.services.join(", ")),
    ]
    .join("\n")
}

pub fn handle(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let info = Info::collect(&session.controller);
    let out = output::render_single(&global.output, &info, detail, |i| {
        i.software_version.clone().unwrap_or_default()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
