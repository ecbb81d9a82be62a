//! Flag-aware wrappers over `cocolink-config`.
//!
//! Precedence for every connection setting: CLI flag > env var > profile.

use std::time::Duration;

use secrecy::SecretString;

use cocolink_config::{self as config, Config, ConfigError, Profile};
use cocolink_core::ControllerConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, cfg: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Merge config file, profile, and flags into a `ControllerConfig`.
pub fn resolve_controller_config(global: &GlobalOpts) -> Result<ControllerConfig, CliError> {
    let cfg = config::load_config_or_default();
    let name = active_profile_name(global, &cfg);

    let mut profile = match cfg.profiles.get(&name) {
        Some(profile) => profile.clone(),
        None if global.profile.is_some() => {
            let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
            available.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name,
                available: available.join(", "),
            });
        }
        None if global.host.is_some() => Profile::default(),
        None => {
            return Err(CliError::NoConfig {
                path: config::config_path().display().to_string(),
            });
        }
    };
    apply_overrides(&mut profile, global);

    let token = match global.token {
        Some(ref token) => SecretString::from(token.clone()),
        None => config::resolve_token(&profile, &name).map_err(config_error)?,
    };

    let mut controller = config::build_controller_config(&profile, token).map_err(config_error)?;
    controller.active_timeout = Duration::from_secs(global.timeout);
    Ok(controller)
}

fn apply_overrides(profile: &mut Profile, global: &GlobalOpts) {
    if let Some(ref host) = global.host {
        profile.host.clone_from(host);
    }
    if let Some(port) = global.port {
        profile.port = Some(port);
    }
    if let Some(ref ca) = global.ca_cert {
        profile.ca_cert = Some(ca.clone());
    }
}

pub fn config_error(err: ConfigError) -> CliError {
    match err {
        ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
        ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
        other => CliError::Config(other),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::Cli;

    #[test]
    fn flags_override_profile() {
        let cli = Cli::parse_from([
            "cocolink",
            "--host",
            "10.0.0.9",
            "--port",
            "18884",
            "--ca-cert",
            "/etc/nhc/ca.pem",
            "info",
        ]);
        let mut profile = Profile {
            host: "nhc.local".into(),
            port: Some(8884),
            ..Profile::default()
        };
        apply_overrides(&mut profile, &cli.global);

        assert_eq!(profile.host, "10.0.0.9");
        assert_eq!(profile.port, Some(18884));
        assert_eq!(
            profile.ca_cert.as_deref(),
            Some(std::path::Path::new("/etc/nhc/ca.pem"))
        );
    }

    #[test]
    fn explicit_profile_wins_over_default() {
        let cli = Cli::parse_from(["cocolink", "--profile", "cabin", "info"]);
        let cfg = Config {
            default_profile: Some("home".into()),
            ..Config::default()
        };
        assert_eq!(active_profile_name(&cli.global, &cfg), "cabin");
    }
}
