//! Device state mirror and communication controller between `cocolink-api`
//! and a platform collaborator (CLI, automation bindings).
//!
//! - **[`Controller`]**: Session lifecycle against one controller:
//!   [`start_communication()`](Controller::start_communication) connects and
//!   sends the handshake, the device list fills the registry and opens the
//!   [`communication_active()`](Controller::communication_active) gate, and
//!   `execute_*` turns commands into `devices.control` envelopes with one
//!   forced-restart retry.
//!
//! - **[`DeviceRegistry`]**: Sole owner of device models, one `DashMap` per
//!   category with a lock per entry. Idempotent add, removal with a final
//!   handler notification, and video door station cross-linking.
//!
//! - **Device models** ([`model`]): Typed state per category (action,
//!   thermostat, meter, access, video, alarm) with sparse delta merging and
//!   per-category command encoding.
//!
//! - **[`ReconnectScheduler`]**: Single pending restart with backoff, plus an
//!   optional periodic full refresh.
//!
//! - **[`ControllerEvents`]**: Callbacks to the collaborator;
//!   [`BroadcastEvents`] republishes them on a broadcast channel.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
mod live;
pub mod model;
pub mod registry;
pub mod retry;
pub mod scheduler;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{ControllerConfig, DEFAULT_PORT};
pub use controller::{Controller, SessionState};
pub use error::CoreError;
pub use events::{BroadcastEvents, ControllerEvent, ControllerEvents};
pub use registry::{AddOutcome, DeviceRegistry, NewDevice};
pub use retry::RetryPolicy;
pub use scheduler::{ReconnectConfig, ReconnectScheduler};

pub use model::{
    AccessCommand, AccessKind, AccessState, ActionCommand, ActionKind, ActionState, AlarmCommand,
    AlarmState, Demand, DeviceCategory, DeviceCommand, DeviceHandler, DeviceId, DeviceInfo,
    DeviceSnapshot, DeviceState, MeterKind, MeterState, ThermostatMode, ThermostatState,
    VideoState,
};

// Wire-layer types collaborators need to build a `ControllerConfig`.
pub use cocolink_api::{Credentials, DEFAULT_PROFILE, MqttTransport, TrustAnchors};
