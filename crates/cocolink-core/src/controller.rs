// ── Communication controller ──
//
// Drives the session lifecycle against one controller: handshake,
// inbound dispatch into the registry, the "communication active" gate,
// command execution with retry, and reconnect scheduling.
//
// Lifecycle transitions and inbound dispatch serialize on one async
// mutex. Each session carries a generation number; anything still in
// flight from a superseded session is dropped.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use cocolink_api::codec::{Service, SystemInfo, TimeInfo, method};
use cocolink_api::{Envelope, InboundMessage, SessionTarget, Topic, Transport, TransportState};
use cocolink_api::{decode, encode, topic};

use crate::config::ControllerConfig;
use crate::error::CoreError;
use crate::events::ControllerEvents;
use crate::live::LiveReadings;
use crate::model::{
    AccessCommand, ActionCommand, AlarmCommand, DeviceCommand, DeviceHandler, DeviceId,
    DeviceSnapshot, Encoded, ThermostatMode,
};
use crate::registry::{AddOutcome, DeviceRegistry, NewDevice, lock};
use crate::retry::RetryPolicy;
use crate::scheduler::{Job, ReconnectScheduler};

const INBOUND_CHANNEL_SIZE: usize = 256;

// ── SessionState ─────────────────────────────────────────────────────

/// Session state observable by collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Subscribed; waiting for the device list.
    Handshaking,
    /// Device list received and applied.
    Active,
}

// ── Controller ───────────────────────────────────────────────────────

/// Communication layer for one controller.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Nothing connects until
/// [`start_communication`](Self::start_communication) is called.
pub struct Controller<T: Transport> {
    inner: Arc<ControllerInner<T>>,
}

impl<T: Transport> Clone for Controller<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[derive(Default)]
struct Lifecycle {
    /// Cancels the dispatch and watcher tasks of the current session.
    session: Option<CancellationToken>,
}

struct ControllerInner<T: Transport> {
    config: ControllerConfig,
    transport: T,
    registry: DeviceRegistry,
    events: Arc<dyn ControllerEvents>,
    session_state: watch::Sender<SessionState>,
    /// Active gate of the current session: `None` until decided.
    gate: Mutex<watch::Sender<Option<bool>>>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    generation: AtomicU64,
    scheduler: ReconnectScheduler,
    refresh_armed: AtomicBool,
    live: LiveReadings,
    retry: RetryPolicy,
    system_info: ArcSwapOption<SystemInfo>,
    time_info: ArcSwapOption<TimeInfo>,
    services: ArcSwap<Vec<Service>>,
    cancel: CancellationToken,
}

impl<T: Transport> Controller<T> {
    pub fn new(config: ControllerConfig, transport: T, events: Arc<dyn ControllerEvents>) -> Self {
        let cancel = CancellationToken::new();
        let inner = Arc::new_cyclic(|weak: &Weak<ControllerInner<T>>| {
            let restart = restart_job(weak.clone());
            let (session_state, _) = watch::channel(SessionState::Disconnected);
            let (gate, _) = watch::channel(None);
            ControllerInner {
                registry: DeviceRegistry::new(config.inverted_shutters.iter().cloned()),
                scheduler: ReconnectScheduler::new(
                    config.reconnect.clone(),
                    restart,
                    cancel.child_token(),
                ),
                live: LiveReadings::new(config.meter_resubscribe),
                config,
                transport,
                events,
                session_state,
                gate: Mutex::new(gate),
                lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
                generation: AtomicU64::new(0),
                refresh_armed: AtomicBool::new(false),
                retry: RetryPolicy::default(),
                system_info: ArcSwapOption::empty(),
                time_info: ArcSwapOption::empty(),
                services: ArcSwap::from_pointee(Vec::new()),
                cancel,
            }
        });
        Self { inner }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn session_state(&self) -> watch::Receiver<SessionState> {
        self.inner.session_state.subscribe()
    }

    /// Snapshots of every known device, ordered by id.
    pub fn devices(&self) -> Vec<DeviceSnapshot> {
        self.inner.registry.snapshots()
    }

    pub fn device(&self, id: &DeviceId) -> Option<DeviceSnapshot> {
        self.inner.registry.get(id).map(|entry| lock(&entry).snapshot())
    }

    pub fn system_info(&self) -> Option<Arc<SystemInfo>> {
        self.inner.system_info.load_full()
    }

    pub fn time_info(&self) -> Option<Arc<TimeInfo>> {
        self.inner.time_info.load_full()
    }

    pub fn services(&self) -> Arc<Vec<Service>> {
        self.inner.services.load_full()
    }

    pub fn register_handler(
        &self,
        id: &DeviceId,
        handler: Weak<dyn DeviceHandler>,
    ) -> Result<(), CoreError> {
        self.inner.registry.register_handler(id, handler)
    }

    pub fn unregister_handler(&self, id: &DeviceId) {
        self.inner.registry.unregister_handler(id);
    }

    pub fn set_inverted(&self, id: &DeviceId, inverted: bool) {
        self.inner.registry.set_inverted(id, inverted);
    }

    /// Replace the periodic full-refresh timer.
    pub fn set_refresh_interval(&self, interval: Option<Duration>) {
        self.inner.refresh_armed.store(true, Ordering::Relaxed);
        self.inner.scheduler.set_refresh_interval(interval);
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Connect, subscribe, and send the handshake requests.
    ///
    /// Returns once the handshake is published; wait on
    /// [`communication_active`](Self::communication_active) for the device list.
    pub async fn start_communication(&self) -> Result<(), CoreError> {
        if !self.inner.refresh_armed.swap(true, Ordering::Relaxed) {
            self.inner
                .scheduler
                .set_refresh_interval(self.inner.config.refresh_interval);
        }
        let mut lifecycle = self.inner.lifecycle.lock().await;
        self.start_locked(&mut lifecycle).await
    }

    /// Tear down the current session and start a new one.
    pub async fn restart_communication(&self) -> Result<(), CoreError> {
        info!(host = %self.inner.config.host, "Restarting communication");
        let mut lifecycle = self.inner.lifecycle.lock().await;
        self.start_locked(&mut lifecycle).await
    }

    /// Stop the session, cancel live meter timers and any pending restart.
    pub async fn stop_communication(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.scheduler.clear();
        self.inner.live.cancel_all();
        self.teardown(&mut lifecycle).await;
        self.decide_gate(false);
        self.set_state(SessionState::Disconnected);
        info!("Communication stopped");
    }

    /// Stop for good, including the periodic refresh timer.
    pub async fn shutdown(&self) {
        self.stop_communication().await;
        self.inner.scheduler.shutdown();
        self.inner.cancel.cancel();
    }

    /// Wait, bounded by the active timeout, for the current session to
    /// receive its device list.
    pub async fn communication_active(&self) -> bool {
        let mut rx = self
            .inner
            .gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribe();
        let timeout = self.inner.config.active_timeout;
        match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(decided)) => decided.unwrap_or(false),
            Ok(Err(_)) => false,
            Err(_) => {
                debug!(timeout_secs = timeout.as_secs(), "Timed out waiting for active session");
                false
            }
        }
    }

    async fn start_locked(&self, lifecycle: &mut Lifecycle) -> Result<(), CoreError> {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.replace_gate();
        self.teardown(lifecycle).await;

        let target = match self.session_target() {
            Ok(target) => target,
            Err(e) => {
                self.fail_session(&e);
                return Err(e);
            }
        };

        self.set_state(SessionState::Connecting);
        info!(host = %target.host, port = target.port, profile = %target.profile, "Connecting to controller");

        let session = self.inner.cancel.child_token();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);
        tokio::spawn(dispatch_loop(
            self.clone(),
            inbound_rx,
            generation,
            session.clone(),
        ));

        if let Err(e) = self.inner.transport.start(&target, inbound_tx).await {
            session.cancel();
            let err = CoreError::from(e);
            self.fail_session(&err);
            return Err(err);
        }

        self.set_state(SessionState::Handshaking);
        tokio::spawn(watch_transport(self.clone(), generation, session.clone()));
        lifecycle.session = Some(session);

        if let Err(e) = self.send_handshake().await {
            self.teardown(lifecycle).await;
            self.fail_session(&e);
            return Err(e);
        }
        debug!(generation, "Handshake sent");
        Ok(())
    }

    async fn send_handshake(&self) -> Result<(), CoreError> {
        let profile = &self.inner.config.profile;
        let requests = [
            (topic::system_cmd(profile), method::SYSTEMINFO_PUBLISH),
            (topic::authentication_cmd(profile), method::SERVICES_LIST),
            (topic::devices_cmd(profile), method::DEVICES_LIST),
            (topic::notification_cmd(profile), method::NOTIFICATIONS_LIST),
        ];
        for (channel, request) in requests {
            let payload = encode(&Envelope::request(request))?;
            self.inner.transport.publish(&channel, payload).await?;
        }
        Ok(())
    }

    async fn teardown(&self, lifecycle: &mut Lifecycle) {
        if let Some(session) = lifecycle.session.take() {
            session.cancel();
        }
        self.inner.transport.stop().await;
    }

    fn session_target(&self) -> Result<SessionTarget, CoreError> {
        let config = &self.inner.config;
        if config.host.trim().is_empty() {
            return Err(CoreError::Configuration {
                reason: "no controller address configured".into(),
            });
        }
        let credentials = config
            .credentials
            .clone()
            .ok_or_else(|| CoreError::Configuration {
                reason: "no credentials configured".into(),
            })?;
        credentials.validate(Utc::now())?;
        let trust = config.trust.clone().ok_or_else(|| CoreError::Configuration {
            reason: "no controller CA certificate configured".into(),
        })?;

        let client_id = if config.client_id.is_empty() {
            format!("cocolink-{}", uuid::Uuid::new_v4().simple())
        } else {
            config.client_id.clone()
        };

        Ok(SessionTarget {
            host: config.host.clone(),
            port: config.port,
            client_id,
            profile: config.profile.clone(),
            credentials,
            trust,
            keep_alive: config.keep_alive,
            connect_timeout: config.connect_timeout,
        })
    }

    /// Report a failed session start. Configuration errors are reported
    /// once and never retried.
    fn fail_session(&self, err: &CoreError) {
        self.set_state(SessionState::Disconnected);
        self.decide_gate(false);
        if err.is_configuration() {
            warn!(error = %err, "Controller configuration error");
            self.inner.events.configuration_error(&err.to_string());
        } else {
            warn!(error = %err, "Could not start communication");
            self.inner.events.controller_offline(&err.to_string());
            self.inner.scheduler.schedule(&err.to_string());
        }
    }

    /// The transport of session `generation` dropped.
    async fn connection_lost(&self, generation: u64, reason: &str) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            trace!(generation, "Ignoring loss of superseded session");
            return;
        }
        warn!(reason, "Connection to controller lost");
        self.teardown(&mut lifecycle).await;
        self.decide_gate(false);
        self.set_state(SessionState::Disconnected);
        self.inner.events.controller_offline(reason);
        self.inner.scheduler.schedule(reason);
    }

    fn set_state(&self, state: SessionState) {
        self.inner.session_state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(from = %current, to = %state, "Session state");
            *current = state;
            true
        });
    }

    /// Fail the current gate and install a fresh one.
    fn replace_gate(&self) {
        let mut gate = self.inner.gate.lock().unwrap_or_else(PoisonError::into_inner);
        gate.send_if_modified(|v| {
            if v.is_none() {
                *v = Some(false);
                true
            } else {
                false
            }
        });
        let (fresh, _) = watch::channel(None);
        *gate = fresh;
    }

    fn decide_gate(&self, active: bool) {
        let gate = self.inner.gate.lock().unwrap_or_else(PoisonError::into_inner);
        gate.send_replace(Some(active));
    }

    // ── Inbound dispatch ─────────────────────────────────────────────

    async fn dispatch(&self, generation: u64, message: InboundMessage) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            trace!(topic = %message.topic, "Dropping message from superseded session");
            return;
        }

        let kind = Topic::classify(&self.inner.config.profile, &message.topic);
        match kind {
            Topic::Other => {
                trace!(topic = %message.topic, "Unrouted topic");
                return;
            }
            Topic::DevicesError => {
                warn!(
                    topic = %message.topic,
                    payload = %String::from_utf8_lossy(&message.payload),
                    "Controller reported a device error"
                );
                return;
            }
            _ => {}
        }

        let envelope = match decode(&message.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Dropping undecodable message");
                return;
            }
        };
        trace!(topic = %kind, method = %envelope.method, "Inbound");

        match kind {
            Topic::DevicesResponse => self.on_devices_response(&envelope),
            Topic::DevicesEvent => self.on_devices_event(&envelope),
            Topic::SystemEvent | Topic::SystemResponse => self.on_system(&envelope),
            Topic::ServicesResponse => self.on_services(&envelope),
            Topic::NotificationEvent | Topic::NotificationResponse => {
                self.on_notifications(&envelope);
            }
            Topic::DevicesError | Topic::Other => {}
        }
    }

    fn on_devices_response(&self, envelope: &Envelope) {
        if envelope.method != method::DEVICES_LIST {
            trace!(method = %envelope.method, "Device response ignored");
            return;
        }

        let now = Utc::now();
        let registry = &self.inner.registry;
        let mut seen = HashSet::new();
        for wire in envelope.devices() {
            if let Some(id) = self.add_device(wire) {
                registry.apply(&id, &wire.property_view(), now);
                seen.insert(id);
            }
        }
        for id in registry.ids() {
            if !seen.contains(&id) {
                info!(device = %id, "Device no longer listed by controller");
                self.remove_device(&id);
            }
        }

        info!(devices = registry.len(), "Device list received");
        self.set_state(SessionState::Active);
        self.decide_gate(true);
        self.inner.scheduler.clear();
        self.inner.events.controller_online();
    }

    /// Apply one event envelope: removals, then additions, then updates.
    fn on_devices_event(&self, envelope: &Envelope) {
        let registry = &self.inner.registry;
        let now = Utc::now();
        let removing = envelope.method == method::DEVICES_REMOVED;
        let adding = matches!(
            envelope.method.as_str(),
            method::DEVICES_ADDED | method::DEVICES_CHANGED
        );

        if removing {
            for wire in envelope.devices() {
                if let Some(uuid) = wire.uuid.as_deref() {
                    self.remove_device(&DeviceId::new(uuid));
                }
            }
            return;
        }

        let mut ids = Vec::new();
        for wire in envelope.devices() {
            let id = if adding {
                self.add_device(wire)
            } else {
                wire.uuid.as_deref().map(DeviceId::new)
            };
            if let Some(id) = id {
                ids.push((id, wire.property_view()));
            }
        }
        for (id, view) in ids {
            registry.apply(&id, &view, now);
        }
    }

    fn remove_device(&self, id: &DeviceId) {
        self.inner.registry.remove(id);
        if self.inner.live.cancel(id) {
            debug!(device = %id, "Live readings dropped with device");
        }
    }

    fn add_device(&self, wire: &cocolink_api::WireDevice) -> Option<DeviceId> {
        let Some(new) = NewDevice::from_wire(wire) else {
            debug!(
                uuid = wire.uuid.as_deref().unwrap_or_default(),
                device_type = wire.device_type.as_deref().unwrap_or_default(),
                model = wire.model.as_deref().unwrap_or_default(),
                "Unsupported device ignored"
            );
            return None;
        };
        let id = new.id.clone();
        match self.inner.registry.add(new) {
            AddOutcome::Inserted | AddOutcome::Updated => Some(id),
            AddOutcome::Conflict => None,
        }
    }

    fn on_system(&self, envelope: &Envelope) {
        if let Some(info) = envelope.system_info() {
            debug!(version = info.sw_version.as_deref().unwrap_or_default(), "System info");
            self.inner.system_info.store(Some(Arc::new(info.clone())));
            self.inner.events.properties_changed(info);
        }
        if let Some(time) = envelope.time_info() {
            self.inner.time_info.store(Some(Arc::new(time.clone())));
        }
    }

    fn on_services(&self, envelope: &Envelope) {
        if let Some(services) = envelope.services() {
            debug!(count = services.len(), "Services list");
            self.inner.services.store(Arc::new(services.to_vec()));
        }
    }

    fn on_notifications(&self, envelope: &Envelope) {
        for notification in envelope.notifications() {
            let is_new = notification
                .status
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("new"));
            if !is_new {
                continue;
            }
            let text = notification.text.as_deref().unwrap_or_default();
            match notification.kind.as_deref() {
                Some("alarm") => self.inner.events.alarm_event(text),
                Some("notification") => self.inner.events.notice_event(text),
                other => debug!(kind = other.unwrap_or_default(), "Notification ignored"),
            }
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn execute_action(
        &self,
        id: &DeviceId,
        command: ActionCommand,
    ) -> Result<(), CoreError> {
        self.execute(id, &DeviceCommand::Action(command)).await
    }

    pub async fn execute_thermostat_mode(
        &self,
        id: &DeviceId,
        mode: ThermostatMode,
    ) -> Result<(), CoreError> {
        self.execute(id, &DeviceCommand::ThermostatMode(mode)).await
    }

    /// Overrule the schedule. `setpoint` is in tenths of °C; `None` minutes
    /// uses the configured default; zero or negative clears the overrule.
    pub async fn execute_thermostat_overrule(
        &self,
        id: &DeviceId,
        setpoint: i32,
        minutes: Option<i32>,
    ) -> Result<(), CoreError> {
        self.execute(id, &DeviceCommand::ThermostatOverrule { setpoint, minutes })
            .await
    }

    /// Hold a live power subscription on a meter.
    pub async fn execute_meter_live_start(&self, id: &DeviceId) -> Result<(), CoreError> {
        self.ensure_active(id).await?;
        let encoded = self.encode(id, &DeviceCommand::MeterLive(true))?;
        let payloads = self.payloads(id, &encoded)?;
        let job = self.publish_job(payloads);
        if self.inner.live.start(id, job) {
            info!(device = %id, "Live readings started");
        }
        Ok(())
    }

    /// Release a live power subscription. The last holder sends the stop.
    pub async fn execute_meter_live_stop(&self, id: &DeviceId) -> Result<(), CoreError> {
        if !self.inner.live.stop(id) {
            return Ok(());
        }
        info!(device = %id, "Live readings stopped");
        let encoded = self.encode(id, &DeviceCommand::MeterLive(false))?;
        self.send(id, &encoded).await
    }

    pub async fn execute_access_unlock(&self, id: &DeviceId) -> Result<(), CoreError> {
        self.execute(id, &DeviceCommand::Access(AccessCommand::Unlock))
            .await
    }

    pub async fn execute_access_bell(&self, id: &DeviceId) -> Result<(), CoreError> {
        self.execute(id, &DeviceCommand::Access(AccessCommand::Bell))
            .await
    }

    pub async fn execute_access_ring_and_come_in(
        &self,
        id: &DeviceId,
        enable: bool,
    ) -> Result<(), CoreError> {
        self.execute(id, &DeviceCommand::Access(AccessCommand::RingAndComeIn(enable)))
            .await
    }

    pub async fn execute_alarm_arm(&self, id: &DeviceId) -> Result<(), CoreError> {
        self.execute(id, &DeviceCommand::Alarm(AlarmCommand::Arm))
            .await
    }

    pub async fn execute_alarm_disarm(&self, id: &DeviceId) -> Result<(), CoreError> {
        self.execute(id, &DeviceCommand::Alarm(AlarmCommand::Disarm))
            .await
    }

    /// Encode and send `command`. Device state is left to the echo from
    /// the controller.
    pub async fn execute(&self, id: &DeviceId, command: &DeviceCommand) -> Result<(), CoreError> {
        self.ensure_active(id).await?;
        let encoded = self.encode(id, command)?;
        debug!(device = %id, ?command, messages = encoded.len(), "Executing command");
        self.send(id, &encoded).await
    }

    fn encode(&self, id: &DeviceId, command: &DeviceCommand) -> Result<Encoded, CoreError> {
        let entry = self
            .inner
            .registry
            .get(id)
            .ok_or_else(|| CoreError::DeviceNotReady { id: id.to_string() })?;
        let device = lock(&entry);
        device.encode_command(command, self.inner.config.default_overrule_minutes)
    }

    fn payloads(&self, id: &DeviceId, encoded: &Encoded) -> Result<Vec<Vec<u8>>, CoreError> {
        encoded
            .iter()
            .map(|props| {
                encode(&Envelope::device_control(id.as_str(), props.clone())).map_err(CoreError::from)
            })
            .collect()
    }

    /// One synchronous restart when the session is not usable.
    async fn ensure_active(&self, id: &DeviceId) -> Result<(), CoreError> {
        if self.is_active() {
            return Ok(());
        }
        debug!(device = %id, "Session inactive, restarting before command");
        self.restart_and_wait()
            .await
            .map_err(|e| self.command_failed(id, e))
    }

    fn is_active(&self) -> bool {
        *self.inner.session_state.borrow() == SessionState::Active
            && self.inner.transport.is_subscribed()
    }

    /// Restart and wait for the device list. A session that never lists
    /// its devices is closed again.
    async fn restart_and_wait(&self) -> Result<(), CoreError> {
        self.restart_communication().await?;
        let generation = self.inner.generation.load(Ordering::SeqCst);
        if self.communication_active().await {
            return Ok(());
        }
        let err = CoreError::Timeout {
            timeout_secs: self.inner.config.active_timeout.as_secs(),
        };
        self.abandon_handshake(generation, &err).await;
        Err(err)
    }

    /// Close session `generation` if it is still waiting for its device
    /// list, and hand recovery to the scheduler.
    async fn abandon_handshake(&self, generation: u64, err: &CoreError) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if self.inner.generation.load(Ordering::SeqCst) != generation
            || *self.inner.session_state.borrow() == SessionState::Active
        {
            return;
        }
        warn!(generation, error = %err, "No device list from controller, closing session");
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.teardown(&mut lifecycle).await;
        self.decide_gate(false);
        self.set_state(SessionState::Disconnected);
        self.inner.events.controller_offline(&err.to_string());
        self.inner.scheduler.schedule(&err.to_string());
    }

    /// Final report for a command that could not be delivered.
    fn command_failed(&self, id: &DeviceId, err: CoreError) -> CoreError {
        warn!(device = %id, error = %err, "Command failed");
        if err.is_communication() {
            let reason = format!("command for {id} not delivered: {err}");
            self.inner.events.controller_offline(&reason);
            self.inner.scheduler.schedule(&reason);
        }
        err
    }

    /// Publish each envelope in order, retrying through one forced restart.
    async fn send(&self, id: &DeviceId, encoded: &Encoded) -> Result<(), CoreError> {
        let topic = topic::devices_cmd(&self.inner.config.profile);
        for payload in self.payloads(id, encoded)? {
            let result = self
                .inner
                .retry
                .run(
                    || async {
                        self.inner
                            .transport
                            .publish(&topic, payload.clone())
                            .await
                            .map_err(CoreError::from)
                    },
                    || self.restart_and_wait(),
                )
                .await;

            result.map_err(|e| self.command_failed(id, e))?;
        }
        Ok(())
    }

    /// Job that publishes `payloads` once, for the live meter timer.
    fn publish_job(&self, payloads: Vec<Vec<u8>>) -> Job {
        let weak = Arc::downgrade(&self.inner);
        let topic = topic::devices_cmd(&self.inner.config.profile);
        Arc::new(move || {
            let weak = weak.clone();
            let topic = topic.clone();
            let payloads = payloads.clone();
            Box::pin(async move {
                let Some(inner) = weak.upgrade() else {
                    return Ok(());
                };
                for payload in payloads {
                    inner.transport.publish(&topic, payload).await?;
                }
                Ok(())
            })
        })
    }
}

/// Restart job for the scheduler; holds the controller weakly. Only a
/// session that reaches Active counts as a successful restart.
fn restart_job<T: Transport>(weak: Weak<ControllerInner<T>>) -> Job {
    Arc::new(move || {
        let weak = weak.clone();
        Box::pin(async move {
            match weak.upgrade() {
                Some(inner) => Controller { inner }.restart_and_wait().await,
                None => Ok(()),
            }
        })
    })
}

// ── Background tasks ─────────────────────────────────────────────────

/// Consume inbound messages of one session in receipt order.
async fn dispatch_loop<T: Transport>(
    controller: Controller<T>,
    mut inbound: mpsc::Receiver<InboundMessage>,
    generation: u64,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = inbound.recv() => {
                let Some(message) = message else { break };
                controller.dispatch(generation, message).await;
            }
        }
    }
    trace!(generation, "Dispatch loop exiting");
}

/// Turn transport failures of one session into connection loss.
async fn watch_transport<T: Transport>(
    controller: Controller<T>,
    generation: u64,
    cancel: CancellationToken,
) {
    let mut state = controller.inner.transport.state();
    let _ = state.borrow_and_update();
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let reason = match &*state.borrow_and_update() {
                    TransportState::Failed(reason) => reason.clone(),
                    TransportState::Disconnected => "transport disconnected".to_owned(),
                    _ => continue,
                };
                controller.connection_lost(generation, &reason).await;
                break;
            }
        }
    }
}
