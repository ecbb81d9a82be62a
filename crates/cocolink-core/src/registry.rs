// ── Device registry ──
//
// Sole owner of device models. One concurrent map per category; each
// entry carries its own lock so independent devices never contend.
// No method holds two entry locks at once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use tracing::{debug, warn};

use cocolink_api::{Parameter, Property, WireDevice};

use crate::error::CoreError;
use crate::model::{
    ActionKind, Device, DeviceCategory, DeviceEntry, DeviceHandler, DeviceId, DeviceMeta,
    DeviceSnapshot, DeviceState, MacAddress,
};

/// Result of [`DeviceRegistry::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new model was constructed.
    Inserted,
    /// The id was known; name and location were refreshed in place.
    Updated,
    /// The id is registered under a different category and was left alone.
    Conflict,
}

/// Constructor arguments for a device model.
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub id: DeviceId,
    pub category: DeviceCategory,
    pub name: String,
    pub location: Option<String>,
    pub meta: DeviceMeta,
    pub parameters: Parameter,
}

impl NewDevice {
    /// Build from a wire record. `None` for unsupported or anonymous devices.
    pub fn from_wire(device: &WireDevice) -> Option<Self> {
        let uuid = device.uuid.as_deref().filter(|u| !u.is_empty())?;
        let category = DeviceCategory::from_wire(device)?;
        let parameters = device.parameter_view();
        Some(Self {
            id: DeviceId::new(uuid),
            category,
            name: device.name.clone().unwrap_or_else(|| uuid.to_owned()),
            location: parameters.location_name.clone(),
            meta: DeviceMeta::from_wire(device),
            parameters,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    Action,
    Thermostat,
    Meter,
    Access,
    Video,
    Alarm,
}

impl From<DeviceCategory> for Slot {
    fn from(category: DeviceCategory) -> Self {
        match category {
            DeviceCategory::Action(_) => Self::Action,
            DeviceCategory::Thermostat => Self::Thermostat,
            DeviceCategory::Meter(_) => Self::Meter,
            DeviceCategory::Access(_) => Self::Access,
            DeviceCategory::Video => Self::Video,
            DeviceCategory::Alarm => Self::Alarm,
        }
    }
}

const SLOTS: [Slot; 6] = [
    Slot::Action,
    Slot::Thermostat,
    Slot::Meter,
    Slot::Access,
    Slot::Video,
    Slot::Alarm,
];

#[derive(Default)]
pub struct DeviceRegistry {
    actions: DashMap<DeviceId, DeviceEntry>,
    thermostats: DashMap<DeviceId, DeviceEntry>,
    meters: DashMap<DeviceId, DeviceEntry>,
    access: DashMap<DeviceId, DeviceEntry>,
    video: DashMap<DeviceId, DeviceEntry>,
    alarms: DashMap<DeviceId, DeviceEntry>,
    /// Roller shutters that take the raw position scale.
    inverted: DashSet<DeviceId>,
}

impl DeviceRegistry {
    pub fn new(inverted: impl IntoIterator<Item = DeviceId>) -> Self {
        let registry = Self::default();
        for id in inverted {
            registry.inverted.insert(id);
        }
        registry
    }

    fn map(&self, slot: Slot) -> &DashMap<DeviceId, DeviceEntry> {
        match slot {
            Slot::Action => &self.actions,
            Slot::Thermostat => &self.thermostats,
            Slot::Meter => &self.meters,
            Slot::Access => &self.access,
            Slot::Video => &self.video,
            Slot::Alarm => &self.alarms,
        }
    }

    fn find(&self, id: &DeviceId) -> Option<(Slot, DeviceEntry)> {
        SLOTS.into_iter().find_map(|slot| {
            self.map(slot)
                .get(id)
                .map(|entry| (slot, Arc::clone(entry.value())))
        })
    }

    // ── Membership ───────────────────────────────────────────────────

    /// Insert a device, or refresh name and location if it already exists.
    ///
    /// Rediscovery keeps live state and the registered handler.
    pub fn add(&self, new: NewDevice) -> AddOutcome {
        let slot = Slot::from(new.category);

        if let Some((existing_slot, entry)) = self.find(&new.id) {
            let mut device = lock(&entry);
            if existing_slot != slot || device.info().category() != new.category {
                warn!(
                    device = %new.id,
                    existing = %device.info().category(),
                    reported = %new.category,
                    "Device reported with a different category; keeping the original"
                );
                return AddOutcome::Conflict;
            }
            device.rename(new.name, new.location);
            debug!(device = %new.id, "Device rediscovered");
            return AddOutcome::Updated;
        }

        let mut device = Device::new(
            new.id.clone(),
            new.category,
            new.name,
            new.location,
            new.meta,
            &new.parameters,
        );
        if self.inverted.contains(&new.id) {
            device.set_inverted(true);
        }
        debug!(device = %new.id, category = %new.category, "Device added");
        self.map(slot).insert(new.id, Arc::new(Mutex::new(device)));

        if matches!(slot, Slot::Access | Slot::Video) {
            self.reconcile_links();
        }
        AddOutcome::Inserted
    }

    /// Remove a device from whichever category holds it.
    ///
    /// The last registered handler receives one `removed` notification.
    /// Returns `false` for an unknown id.
    pub fn remove(&self, id: &DeviceId) -> bool {
        let Some((slot, entry)) = self.find(id) else {
            debug!(device = %id, "Remove for unknown device");
            return false;
        };
        self.map(slot).remove(id);
        lock(&entry).remove();
        debug!(device = %id, "Device removed");

        match slot {
            Slot::Video => self.unlink_video(id),
            Slot::Access => self.unlink_access(id),
            _ => {}
        }
        true
    }

    /// Look up a device in any category.
    pub fn get(&self, id: &DeviceId) -> Option<DeviceEntry> {
        self.find(id).map(|(_, entry)| entry)
    }

    /// Look up a device within one category. Sub-kinds are not compared.
    pub fn get_in(&self, category: DeviceCategory, id: &DeviceId) -> Option<DeviceEntry> {
        self.map(Slot::from(category))
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Every registered id, in no particular order.
    pub fn ids(&self) -> Vec<DeviceId> {
        SLOTS
            .into_iter()
            .flat_map(|slot| {
                self.map(slot)
                    .iter()
                    .map(|r| r.key().clone())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.find(id).is_some()
    }

    pub fn len(&self) -> usize {
        SLOTS.into_iter().map(|slot| self.map(slot).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshots of every device, ordered by id.
    pub fn snapshots(&self) -> Vec<DeviceSnapshot> {
        let entries: Vec<DeviceEntry> = SLOTS
            .into_iter()
            .flat_map(|slot| {
                self.map(slot)
                    .iter()
                    .map(|r| Arc::clone(r.value()))
                    .collect::<Vec<_>>()
            })
            .collect();
        let mut snapshots: Vec<DeviceSnapshot> =
            entries.iter().map(|entry| lock(entry).snapshot()).collect();
        snapshots.sort_by(|a, b| a.info.id().cmp(b.info.id()));
        snapshots
    }

    // ── State ────────────────────────────────────────────────────────

    /// Merge a state delta into a device. Returns `false` for an unknown id.
    ///
    /// Call-status changes on a video station propagate a bell state to the
    /// linked access points.
    pub fn apply(&self, id: &DeviceId, view: &Property, now: DateTime<Utc>) -> bool {
        let Some((slot, entry)) = self.find(id) else {
            debug!(device = %id, "State update for unknown device");
            return false;
        };

        let rings: Vec<(DeviceId, bool)> = {
            let mut device = lock(&entry);
            let touched = device.apply_state(view, now);
            match (slot, device.state()) {
                (Slot::Video, DeviceState::Video(video)) => touched
                    .into_iter()
                    .filter_map(|button| {
                        let linked = video.linked.get(usize::from(button).checked_sub(1)?)?;
                        linked.clone().map(|a| (a, video.is_ringing(button)))
                    })
                    .collect(),
                _ => Vec::new(),
            }
        };

        for (access_id, ringing) in rings {
            let Some(access) = self.access.get(&access_id).map(|r| Arc::clone(r.value())) else {
                continue;
            };
            let mut device = lock(&access);
            if let DeviceState::Access(state) = device.state_mut() {
                if state.bell != ringing {
                    state.bell = ringing;
                    device.notify();
                }
            }
        }
        true
    }

    // ── Handlers ─────────────────────────────────────────────────────

    pub fn register_handler(
        &self,
        id: &DeviceId,
        handler: Weak<dyn DeviceHandler>,
    ) -> Result<(), CoreError> {
        let entry = self.get(id).ok_or_else(|| CoreError::DeviceNotReady {
            id: id.to_string(),
        })?;
        lock(&entry).register_handler(handler);
        Ok(())
    }

    /// Clear the handler. Unknown ids and empty slots are ignored.
    pub fn unregister_handler(&self, id: &DeviceId) {
        if let Some(entry) = self.get(id) {
            lock(&entry).unregister_handler();
        }
    }

    /// Mark a roller shutter as taking the raw position scale.
    pub fn set_inverted(&self, id: &DeviceId, inverted: bool) {
        if inverted {
            self.inverted.insert(id.clone());
        } else {
            self.inverted.remove(id);
        }
        if let Some(entry) = self.get_in(DeviceCategory::Action(ActionKind::RollerShutter), id) {
            lock(&entry).set_inverted(inverted);
        }
    }

    // ── Video links ──────────────────────────────────────────────────

    /// Link access points to video stations by MAC, in either discovery order.
    fn reconcile_links(&self) {
        let stations: Vec<(DeviceId, MacAddress)> = self
            .video
            .iter()
            .filter_map(|r| {
                let device = lock(r.value());
                match device.state() {
                    DeviceState::Video(v) => v.mac.clone().map(|mac| (r.key().clone(), mac)),
                    _ => None,
                }
            })
            .collect();
        if stations.is_empty() {
            return;
        }

        let access: Vec<(DeviceId, DeviceEntry)> = self
            .access
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();

        let mut links: Vec<(DeviceId, u8, DeviceId)> = Vec::new();
        for (access_id, entry) in access {
            let mut device = lock(&entry);
            let DeviceState::Access(state) = device.state_mut() else {
                continue;
            };
            let Some(link) = state.video.as_mut() else {
                continue;
            };
            if link.video.is_some() {
                continue;
            }
            if let Some((video_id, _)) = stations.iter().find(|(_, mac)| *mac == link.mac) {
                link.video = Some(video_id.clone());
                links.push((video_id.clone(), link.button, access_id.clone()));
            }
        }

        for (video_id, button, access_id) in links {
            let Some(entry) = self.video.get(&video_id).map(|r| Arc::clone(r.value())) else {
                continue;
            };
            let mut device = lock(&entry);
            if let DeviceState::Video(state) = device.state_mut() {
                let index = usize::from(button).saturating_sub(1);
                if let Some(slot) = state.linked.get_mut(index) {
                    debug!(video = %video_id, access = %access_id, button, "Linked access point to video station");
                    *slot = Some(access_id);
                }
            }
        }
    }

    fn unlink_video(&self, video_id: &DeviceId) {
        let access: Vec<DeviceEntry> = self.access.iter().map(|r| Arc::clone(r.value())).collect();
        for entry in access {
            let mut device = lock(&entry);
            if let DeviceState::Access(state) = device.state_mut() {
                if let Some(link) = state.video.as_mut() {
                    if link.video.as_ref() == Some(video_id) {
                        link.video = None;
                    }
                }
            }
        }
    }

    fn unlink_access(&self, access_id: &DeviceId) {
        let stations: Vec<DeviceEntry> = self.video.iter().map(|r| Arc::clone(r.value())).collect();
        for entry in stations {
            let mut device = lock(&entry);
            if let DeviceState::Video(state) = device.state_mut() {
                for slot in &mut state.linked {
                    if slot.as_ref() == Some(access_id) {
                        *slot = None;
                    }
                }
            }
        }
    }
}

/// Lock an entry, recovering from a poisoned lock.
pub(crate) fn lock(entry: &DeviceEntry) -> MutexGuard<'_, Device> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{AccessKind, ActionState, MeterKind};
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        changes: Mutex<Vec<DeviceSnapshot>>,
        removed: Mutex<Vec<DeviceId>>,
    }

    impl DeviceHandler for Recorder {
        fn state_changed(&self, snapshot: &DeviceSnapshot) {
            self.changes.lock().unwrap().push(snapshot.clone());
        }

        fn removed(&self, id: &DeviceId) {
            self.removed.lock().unwrap().push(id.clone());
        }
    }

    fn weak(recorder: &Arc<Recorder>) -> Weak<dyn DeviceHandler> {
        let handler: Arc<dyn DeviceHandler> = recorder.clone();
        Arc::downgrade(&handler)
    }

    fn new_device(id: &str, category: DeviceCategory, name: &str) -> NewDevice {
        NewDevice {
            id: DeviceId::new(id),
            category,
            name: name.into(),
            location: None,
            meta: DeviceMeta::default(),
            parameters: Parameter::default(),
        }
    }

    fn with_params(mut new: NewDevice, f: impl FnOnce(&mut Parameter)) -> NewDevice {
        f(&mut new.parameters);
        new
    }

    fn status(value: &str) -> Property {
        Property {
            status: Some(value.into()),
            ..Property::default()
        }
    }

    #[test]
    fn add_is_idempotent_and_keeps_state() {
        let registry = DeviceRegistry::default();
        let relay = DeviceCategory::Action(ActionKind::Relay);
        let recorder = Arc::new(Recorder::default());

        assert_eq!(registry.add(new_device("a", relay, "Kitchen")), AddOutcome::Inserted);
        registry.register_handler(&DeviceId::new("a"), weak(&recorder)).unwrap();
        registry.apply(&DeviceId::new("a"), &status("On"), Utc::now());

        let mut again = new_device("a", relay, "Kitchen light");
        again.location = Some("Ground floor".into());
        assert_eq!(registry.add(again), AddOutcome::Updated);
        assert_eq!(registry.len(), 1);

        let entry = registry.get(&DeviceId::new("a")).unwrap();
        let device = lock(&entry);
        assert_eq!(device.info().name, "Kitchen light");
        assert_eq!(device.info().location.as_deref(), Some("Ground floor"));
        assert_eq!(
            device.state(),
            &DeviceState::Action(ActionState {
                on: true,
                ..ActionState::default()
            })
        );
        assert!(device.has_handler());
    }

    #[test]
    fn category_conflict_keeps_original() {
        let registry = DeviceRegistry::default();
        registry.add(new_device("x", DeviceCategory::Thermostat, "Hall"));
        let outcome = registry.add(new_device("x", DeviceCategory::Meter(MeterKind::Gas), "Gas"));
        assert_eq!(outcome, AddOutcome::Conflict);
        assert!(registry.get_in(DeviceCategory::Thermostat, &DeviceId::new("x")).is_some());
        assert!(registry.get_in(DeviceCategory::Meter(MeterKind::Gas), &DeviceId::new("x")).is_none());
    }

    #[test]
    fn remove_notifies_once() {
        let registry = DeviceRegistry::default();
        let recorder = Arc::new(Recorder::default());
        let id = DeviceId::new("t");
        registry.add(new_device("t", DeviceCategory::Thermostat, "Hall"));
        registry.register_handler(&id, weak(&recorder)).unwrap();

        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert!(!registry.apply(&id, &status("On"), Utc::now()));

        assert_eq!(*recorder.removed.lock().unwrap(), vec![id.clone()]);
        assert!(recorder.changes.lock().unwrap().is_empty());
        assert!(registry.get(&id).is_none());
    }

    #[test]
    fn handler_for_unknown_device_is_not_ready() {
        let registry = DeviceRegistry::default();
        let recorder = Arc::new(Recorder::default());
        let err = registry
            .register_handler(&DeviceId::new("ghost"), weak(&recorder))
            .unwrap_err();
        assert!(matches!(err, CoreError::DeviceNotReady { .. }));
        registry.unregister_handler(&DeviceId::new("ghost"));
    }

    #[test]
    fn configured_inversion_applies_on_add() {
        let registry = DeviceRegistry::new([DeviceId::new("blind")]);
        registry.add(new_device(
            "blind",
            DeviceCategory::Action(ActionKind::RollerShutter),
            "Blind",
        ));
        let entry = registry.get(&DeviceId::new("blind")).unwrap();
        assert!(matches!(lock(&entry).state(), DeviceState::Action(s) if s.inverted));

        registry.set_inverted(&DeviceId::new("blind"), false);
        assert!(matches!(lock(&entry).state(), DeviceState::Action(s) if !s.inverted));
    }

    fn video_station(id: &str) -> NewDevice {
        with_params(new_device(id, DeviceCategory::Video, "Front door"), |p| {
            p.mac_address = Some("00:11:22:33:44:55".into());
        })
    }

    fn bell(id: &str) -> NewDevice {
        with_params(
            new_device(id, DeviceCategory::Access(AccessKind::BellButton), "Bell"),
            |p| p.button_id = Some("00-11-22-33-44-55_2".into()),
        )
    }

    fn linked_video(registry: &DeviceRegistry, access: &str) -> Option<DeviceId> {
        let entry = registry.get(&DeviceId::new(access)).unwrap();
        let device = lock(&entry);
        match device.state() {
            DeviceState::Access(s) => s.video.as_ref().and_then(|l| l.video.clone()),
            _ => None,
        }
    }

    #[test]
    fn links_access_to_video_in_either_order() {
        let first = DeviceRegistry::default();
        first.add(bell("bell"));
        assert_eq!(linked_video(&first, "bell"), None);
        first.add(video_station("vds"));
        assert_eq!(linked_video(&first, "bell"), Some(DeviceId::new("vds")));

        let second = DeviceRegistry::default();
        second.add(video_station("vds"));
        second.add(bell("bell"));
        assert_eq!(linked_video(&second, "bell"), Some(DeviceId::new("vds")));

        let entry = second.get(&DeviceId::new("vds")).unwrap();
        let device = lock(&entry);
        let DeviceState::Video(video) = device.state() else {
            panic!("expected video state");
        };
        assert_eq!(video.linked[1], Some(DeviceId::new("bell")));
    }

    #[test]
    fn ringing_propagates_to_linked_bell() {
        let registry = DeviceRegistry::default();
        registry.add(video_station("vds"));
        registry.add(bell("bell"));
        let recorder = Arc::new(Recorder::default());
        registry.register_handler(&DeviceId::new("bell"), weak(&recorder)).unwrap();

        let ringing = Property {
            call_status02: Some("Ringing".into()),
            ..Property::default()
        };
        registry.apply(&DeviceId::new("vds"), &ringing, Utc::now());

        let changes = recorder.changes.lock().unwrap();
        assert_eq!(changes.len(), 1);
        assert!(matches!(&changes[0].state, DeviceState::Access(s) if s.bell));
    }

    #[test]
    fn removing_video_clears_link() {
        let registry = DeviceRegistry::default();
        registry.add(video_station("vds"));
        registry.add(bell("bell"));
        registry.remove(&DeviceId::new("vds"));
        assert_eq!(linked_video(&registry, "bell"), None);
    }

    #[test]
    fn snapshots_are_sorted() {
        let registry = DeviceRegistry::default();
        registry.add(new_device("b", DeviceCategory::Alarm, "Alarm"));
        registry.add(new_device("a", DeviceCategory::Thermostat, "Hall"));
        let ids: Vec<String> = registry
            .snapshots()
            .iter()
            .map(|s| s.info.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
