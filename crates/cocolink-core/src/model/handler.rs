// ── Device event handler ──
//
// Each device model has at most one observer. Registering replaces the
// previous one, unregistering is idempotent, and the model only holds a
// weak reference so a dropped platform handler never keeps a model alive.

use std::fmt;
use std::sync::{Arc, Weak};

use super::DeviceId;
use super::DeviceSnapshot;

/// Platform-side observer for one device.
///
/// Callbacks run while the device entry is locked: they must not call back
/// into the registry for the same device.
pub trait DeviceHandler: Send + Sync {
    /// The device state changed; `snapshot` is the full reconciled state.
    fn state_changed(&self, snapshot: &DeviceSnapshot);

    /// The device was removed from the controller. Sent once, last.
    fn removed(&self, id: &DeviceId);
}

/// Optional single observer relation.
#[derive(Default)]
pub struct HandlerSlot(Option<Weak<dyn DeviceHandler>>);

impl HandlerSlot {
    /// Install `handler`, silently replacing any previous one.
    pub fn register(&mut self, handler: Weak<dyn DeviceHandler>) {
        self.0 = Some(handler);
    }

    /// Clear the slot. Safe to call when already empty.
    pub fn unregister(&mut self) {
        self.0 = None;
    }

    /// The live handler, if one is registered and still alive.
    pub fn get(&self) -> Option<Arc<dyn DeviceHandler>> {
        self.0.as_ref().and_then(Weak::upgrade)
    }

    /// Take the handler out, leaving the slot empty.
    pub fn take(&mut self) -> Option<Arc<dyn DeviceHandler>> {
        self.0.take().and_then(|w| w.upgrade())
    }

    pub fn is_registered(&self) -> bool {
        self.0.is_some()
    }
}

impl fmt::Debug for HandlerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.0 {
            None => "none",
            Some(w) if w.strong_count() > 0 => "live",
            Some(_) => "dropped",
        };
        f.debug_tuple("HandlerSlot").field(&state).finish()
    }
}
