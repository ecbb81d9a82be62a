//! Clap derive structures for the `cocolink` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use cocolink_core::ThermostatMode;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// cocolink -- talk to a Niko Home Control Connected Controller
#[derive(Debug, Parser)]
#[command(
    name = "cocolink",
    version,
    about = "Control a Niko Home Control installation from the command line",
    long_about = "Connects to the Connected Controller over MQTT/TLS with a hobby API\n\
        token, mirrors its devices, and executes commands against them.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config profile to use
    #[arg(long, short = 'p', env = "COCOLINK_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Controller address (overrides profile)
    #[arg(long, short = 'H', env = "COCOLINK_HOST", global = true)]
    pub host: Option<String>,

    /// MQTT port (overrides profile)
    #[arg(long, env = "COCOLINK_PORT", global = true)]
    pub port: Option<u16>,

    /// Hobby API token (JWT)
    #[arg(long, env = "COCOLINK_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// PEM file with the controller's CA certificate
    #[arg(long, env = "COCOLINK_CA_CERT", global = true)]
    pub ca_cert: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "COCOLINK_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Seconds to wait for the device list
    #[arg(long, env = "COCOLINK_TIMEOUT", default_value = "10", global = true)]
    pub timeout: u64,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List devices known to the controller
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Stream controller events and device changes
    Watch(WatchArgs),

    /// Switch, dim, trigger, or move an action device
    #[command(alias = "a")]
    Action(ActionArgs),

    /// Thermostat mode and overrule
    #[command(alias = "th")]
    Thermostat(ThermostatArgs),

    /// Energy meter operations
    Meter(MeterArgs),

    /// Door access operations
    Access(AccessArgs),

    /// Alarm panel operations
    Alarm(AlarmArgs),

    /// Controller system information
    Info,

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    /// Only show devices whose category starts with this (e.g. "action", "meter")
    #[arg(long, short = 'c')]
    pub category: Option<String>,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Stop after this many seconds (default: until Ctrl-C)
    #[arg(long)]
    pub secs: Option<u64>,
}

// ── Action ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ActionArgs {
    /// Device UUID or name
    pub device: String,

    /// on, off, trigger, stop, up, down, or a level 0-100
    pub value: cocolink_core::ActionCommand,
}

// ── Thermostat ───────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ThermostatArgs {
    #[command(subcommand)]
    pub command: ThermostatCommand,
}

#[derive(Debug, Subcommand)]
pub enum ThermostatCommand {
    /// Switch the active program
    Mode {
        /// Device UUID or name
        device: String,

        /// Day, Night, Eco, Off, Cool, Prog1, Prog2, Prog3
        mode: ThermostatMode,
    },

    /// Override the schedule with a setpoint
    Overrule {
        /// Device UUID or name
        device: String,

        /// Setpoint in °C (e.g. 21.5)
        setpoint: f64,

        /// Duration in minutes; 0 clears the overrule
        #[arg(long, short = 'm')]
        minutes: Option<i32>,
    },
}

// ── Meter ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct MeterArgs {
    #[command(subcommand)]
    pub command: MeterCommand,
}

#[derive(Debug, Subcommand)]
pub enum MeterCommand {
    /// Follow live power readings
    Live {
        /// Device UUID or name
        device: String,

        /// How long to follow
        #[arg(long, default_value = "60")]
        secs: u64,
    },
}

// ── Access ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AccessArgs {
    #[command(subcommand)]
    pub command: AccessCommand,
}

#[derive(Debug, Subcommand)]
pub enum AccessCommand {
    /// Open the door lock
    Unlock { device: String },

    /// Ring the bell
    Bell { device: String },

    /// Enable or disable ring-and-come-in
    RingAndComeIn {
        device: String,

        #[arg(value_enum)]
        state: Toggle,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

// ── Alarm ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct AlarmArgs {
    #[command(subcommand)]
    pub command: AlarmCommand,
}

#[derive(Debug, Subcommand)]
pub enum AlarmCommand {
    /// Arm the panel
    Arm { device: String },

    /// Disarm the panel
    Disarm { device: String },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the config file and active profile
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name to set as default
        name: String,
    },

    /// Store a hobby API token in the system keyring
    SetToken {
        /// Profile name
        #[arg(long)]
        profile: Option<String>,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
