//! Shared configuration for cocolink tools.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), and
//! translation to `cocolink_core::ControllerConfig`. The CLI layers its
//! flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cocolink_core::{
    ControllerConfig, Credentials, DEFAULT_PORT, DeviceId, ReconnectConfig, TrustAnchors,
};

const KEYRING_SERVICE: &str = "cocolink";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--profile` is not given.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named controller profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Seconds to wait for the device list after connecting.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    10
}

/// One controller.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    /// Controller address (hostname or IP).
    pub host: String,

    /// MQTT port. Defaults to 8884.
    pub port: Option<u16>,

    /// Topic profile and MQTT username. Defaults to `hobby`.
    pub username: Option<String>,

    /// Bearer token (plaintext, prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable holding the bearer token.
    pub token_env: Option<String>,

    /// PEM bundle of the controller's CA.
    pub ca_cert: Option<PathBuf>,

    pub client_id: Option<String>,

    /// Default thermostat overrule duration.
    pub overrule_minutes: Option<i32>,

    /// Periodic full refresh. Unset or zero disables it.
    pub refresh_minutes: Option<u64>,

    pub reconnect_initial_secs: Option<u64>,

    pub reconnect_max_secs: Option<u64>,

    /// Roller shutters reporting the raw position scale.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inverted_shutters: Vec<String>,
}

impl Profile {
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(cocolink_core::DEFAULT_PROFILE)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "cocolink", "cocolink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("cocolink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, with `COCOLINK_` environment overrides on top.
///
/// Nested keys use a double underscore: `COCOLINK_PROFILES__HOME__HOST`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("COCOLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/token"))
}

/// Resolve the bearer token from the credential chain (no CLI flag step).
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's token_env → env var lookup
    if let Some(ref env_name) = profile.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    if let Some(ref token) = profile.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store the bearer token of `profile_name` in the system keyring.
pub fn store_token(profile_name: &str, token: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token.expose_secret())?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `ControllerConfig` from a profile, resolving its token.
pub fn profile_to_controller_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<ControllerConfig, ConfigError> {
    let token = resolve_token(profile, profile_name)?;
    build_controller_config(profile, token)
}

/// Build a `ControllerConfig` from a profile and an already resolved token.
pub fn build_controller_config(
    profile: &Profile,
    token: SecretString,
) -> Result<ControllerConfig, ConfigError> {
    if profile.host.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "host".into(),
            reason: "must not be empty".into(),
        });
    }

    let trust = profile
        .ca_cert
        .as_deref()
        .map(|path| {
            TrustAnchors::from_file(path).map_err(|e| ConfigError::Validation {
                field: "ca_cert".into(),
                reason: format!("{}: {e}", path.display()),
            })
        })
        .transpose()?;

    let defaults = ControllerConfig::default();
    let reconnect = ReconnectConfig {
        initial_delay: profile
            .reconnect_initial_secs
            .map_or(defaults.reconnect.initial_delay, Duration::from_secs),
        max_delay: profile
            .reconnect_max_secs
            .map_or(defaults.reconnect.max_delay, Duration::from_secs),
        ..defaults.reconnect.clone()
    };
    if reconnect.initial_delay.is_zero() || reconnect.max_delay < reconnect.initial_delay {
        return Err(ConfigError::Validation {
            field: "reconnect_initial_secs".into(),
            reason: "must be positive and not above reconnect_max_secs".into(),
        });
    }

    let username = profile.username().to_owned();
    Ok(ControllerConfig {
        host: profile.host.trim().to_owned(),
        port: profile.port.unwrap_or(DEFAULT_PORT),
        credentials: Some(Credentials::new(username.clone(), token)),
        profile: username,
        trust,
        client_id: profile.client_id.clone().unwrap_or_default(),
        reconnect,
        refresh_interval: profile
            .refresh_minutes
            .filter(|m| *m > 0)
            .map(|m| Duration::from_secs(m * 60)),
        default_overrule_minutes: profile
            .overrule_minutes
            .unwrap_or(defaults.default_overrule_minutes),
        inverted_shutters: profile
            .inverted_shutters
            .iter()
            .map(DeviceId::new)
            .collect(),
        ..defaults
    })
}
