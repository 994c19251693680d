//! Harness-owned state shared with the monitor extension.
//!
//! A test creates one `MonitorContext`, hands an `Arc` of it to
//! [`super::MonitorExtension::new`] and keeps another to register the
//! configuration callback and inspect captured events.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::event::Event;
use crate::shared_state::SharedStateValue;

/// Callback receiving a non-empty configuration snapshot.
pub type ConfigurationCallback = Arc<dyn Fn(&SharedStateValue) + Send + Sync>;

/// When the configuration callback may fire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackPolicy {
    /// Fire once per registration. Registering again re-arms the callback.
    Once,
    /// Fire on every event that resolves a non-empty snapshot.
    #[default]
    EveryResolution,
}

/// Live, shared list of captured events.
///
/// Every handle sees the same list: events appended or a reset made after a
/// handle was obtained are visible through it.
#[derive(Clone, Default)]
pub struct CapturedEvents(Arc<Mutex<Vec<Event>>>);

impl CapturedEvents {
    fn guard(&self) -> MutexGuard<'_, Vec<Event>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of captured events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Copy of the event at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Event> {
        self.guard().get(index).cloned()
    }

    /// Copy of the current contents, in arrival order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.guard().clone()
    }

    /// Runs `f` against the live list without copying it.
    pub fn with<R>(&self, f: impl FnOnce(&[Event]) -> R) -> R {
        f(&self.guard())
    }

    pub(crate) fn push(&self, event: Event) {
        self.guard().push(event);
    }

    pub(crate) fn clear(&self) {
        self.guard().clear();
    }
}

impl fmt::Debug for CapturedEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CapturedEvents").field(&self.len()).finish()
    }
}

#[derive(Default)]
struct CallbackSlot {
    callback: Option<ConfigurationCallback>,
    fired: bool,
}

/// Registration state observed by the monitor extension.
pub struct MonitorContext {
    policy: CallbackPolicy,
    slot: Mutex<CallbackSlot>,
    captured: CapturedEvents,
}

impl Default for MonitorContext {
    fn default() -> Self {
        Self::with_callback_policy(CallbackPolicy::default())
    }
}

impl fmt::Debug for MonitorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorContext")
            .field("policy", &self.policy)
            .field("captured", &self.captured)
            .finish_non_exhaustive()
    }
}

impl MonitorContext {
    /// Creates a context with the [`CallbackPolicy::EveryResolution`] policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn with_callback_policy(policy: CallbackPolicy) -> Self {
        Self {
            policy,
            slot: Mutex::new(CallbackSlot::default()),
            captured: CapturedEvents::default(),
        }
    }

    #[must_use]
    #[allow(missing_docs)]
    pub const fn callback_policy(&self) -> CallbackPolicy {
        self.policy
    }

    /// Stores `callback`, replacing any earlier one.
    pub fn register_configuration_callback<F>(&self, callback: F)
    where
        F: Fn(&SharedStateValue) + Send + Sync + 'static,
    {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.callback = Some(Arc::new(callback));
        slot.fired = false;
    }

    /// Live handle to the captured events.
    #[must_use]
    pub fn captured_events(&self) -> CapturedEvents {
        self.captured.clone()
    }

    /// Empties the captured list in place.
    pub fn reset_captured_events(&self) {
        self.captured.clear();
    }

    /// Offers a resolved configuration snapshot to the callback.
    ///
    /// Empty snapshots are ignored. The callback runs outside the lock so it
    /// may register a replacement.
    pub(crate) fn offer_configuration(&self, snapshot: &SharedStateValue) {
        if snapshot.is_empty() {
            return;
        }

        let callback = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            if self.policy == CallbackPolicy::Once && slot.fired {
                return;
            }
            let Some(callback) = slot.callback.clone() else {
                return;
            };
            slot.fired = true;
            callback
        };

        trace!(keys = snapshot.len(), "configuration callback firing");
        callback(snapshot);
    }

    pub(crate) fn capture(&self, event: Event) {
        self.captured.push(event);
    }
}
