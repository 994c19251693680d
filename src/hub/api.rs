//! Handle given to extensions for talking to the hub.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crossbeam_channel::Sender;
use serde_json::json;
use tracing::{debug, trace};

use crate::error::{HubError, HubResult, SharedStateError};
use crate::event::{Event, EventSource, EventType};
use crate::shared_state::{
    SharedStateResolution, SharedStateResult, SharedStateStatus, SharedStateValue, SharedStates,
};

use super::dispatcher::{enqueue_event, HubMsg};
use super::extension::{ListenerEntry, ListenerList};

/// Key under which shared state change events name the publishing extension.
pub const STATE_OWNER_KEY: &str = "stateowner";

fn lock_err(context: &'static str) -> HubError {
    HubError::internal(format!("poisoned lock: {context}"))
}

/// State shared between the hub worker and every API handle.
#[derive(Debug, Default)]
pub(crate) struct HubShared {
    states: RwLock<HashMap<String, SharedStates>>,
    registry: RwLock<Vec<String>>,
    processed: RwLock<HashMap<String, u64>>,
    last_event_number: AtomicU64,
}

impl HubShared {
    pub fn last_event_number(&self) -> u64 {
        self.last_event_number.load(Ordering::Acquire)
    }

    pub fn next_event_number(&self) -> u64 {
        self.last_event_number.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn add_extension(&self, name: &str) {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());
    }

    /// Forgets everything about `name`, including its shared state.
    pub fn remove_extension(&self, name: &str) {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|n| n != name);
        self.processed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        self.states
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    pub fn extensions(&self) -> Vec<String> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn mark_processed(&self, name: &str, number: u64) {
        self.processed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), number);
    }

    fn processed(&self, name: &str) -> Option<u64> {
        self.processed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }
}

/// Per-extension handle for listeners, dispatch and shared state.
///
/// Cheap to clone. Every clone refers to the same extension.
#[derive(Clone)]
pub struct ExtensionApi {
    name: String,
    listeners: ListenerList,
    shared: Arc<HubShared>,
    tx: Sender<HubMsg>,
    dropped_events: Arc<AtomicU64>,
}

impl fmt::Debug for ExtensionApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionApi")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ExtensionApi {
    pub(crate) fn new(
        name: String,
        listeners: ListenerList,
        shared: Arc<HubShared>,
        tx: Sender<HubMsg>,
        dropped_events: Arc<AtomicU64>,
    ) -> Self {
        Self {
            name,
            listeners,
            shared,
            tx,
            dropped_events,
        }
    }

    /// Name of the extension owning this handle.
    #[must_use]
    pub fn extension_name(&self) -> &str {
        &self.name
    }

    /// Registers a listener for a `(type, source)` pair. Either side may be a wildcard.
    pub fn register_event_listener<F>(&self, event_type: EventType, source: EventSource, listener: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        trace!(
            extension = %self.name,
            event_type = %event_type,
            source = %source,
            "registering event listener"
        );
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ListenerEntry {
                event_type,
                source,
                listener: Arc::new(listener),
            });
    }

    /// Non-blocking dispatch onto the hub queue.
    pub fn dispatch(&self, event: Event) {
        enqueue_event(&self.tx, &self.dropped_events, event);
    }

    fn version_for(&self, event: Option<&Event>) -> u64 {
        event
            .and_then(|e| e.number)
            .unwrap_or_else(|| self.shared.last_event_number())
    }

    /// Publishes shared state for `event`, or at the latest event number when `None`.
    pub fn create_shared_state(&self, value: SharedStateValue, event: Option<&Event>) -> HubResult<()> {
        let version = self.version_for(event);
        {
            let mut states = self.shared.states.write().map_err(|_| lock_err("shared_states"))?;
            states.entry(self.name.clone()).or_default().set(version, value)?;
        }
        debug!(extension = %self.name, version, "shared state set");
        self.announce_state_change()
    }

    /// Reserves shared state for `event`; the returned resolver publishes the value later.
    pub fn create_pending_shared_state(&self, event: Option<&Event>) -> HubResult<SharedStateResolver> {
        let version = self.version_for(event);
        {
            let mut states = self.shared.states.write().map_err(|_| lock_err("shared_states"))?;
            states.entry(self.name.clone()).or_default().add_pending(version)?;
        }
        debug!(extension = %self.name, version, "shared state pending");
        Ok(SharedStateResolver {
            api: self.clone(),
            version,
        })
    }

    /// Reads the shared state published by `owner` as visible to `event`.
    ///
    /// Returns `None` when `owner` has never published anything. With
    /// `barrier` set, a value is only reported as set once `owner` has
    /// processed every event before `event`.
    #[must_use]
    pub fn get_shared_state(
        &self,
        owner: &str,
        event: Option<&Event>,
        barrier: bool,
        resolution: SharedStateResolution,
    ) -> Option<SharedStateResult> {
        let version = self.version_for(event);
        let mut result = {
            let states = self.shared.states.read().ok()?;
            let history = states.get(owner)?;
            if history.is_empty() {
                return None;
            }
            history.resolve(version, resolution)
        };

        if barrier && result.status == SharedStateStatus::Set {
            let caught_up = self
                .shared
                .processed(owner)
                .is_some_and(|processed| processed + 1 >= version);
            if !caught_up {
                result.status = SharedStateStatus::Pending;
            }
        }

        Some(result)
    }

    fn announce_state_change(&self) -> HubResult<()> {
        let event = Event::builder("Shared state change", EventType::HUB, EventSource::SHARED_STATE)
            .data(json!({ STATE_OWNER_KEY: self.name }))
            .build()?;
        self.dispatch(event);
        Ok(())
    }
}

/// Completes a pending shared state entry.
#[derive(Debug)]
pub struct SharedStateResolver {
    api: ExtensionApi,
    version: u64,
}

impl SharedStateResolver {
    /// The version reserved for this entry.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Publishes `value` into the reserved slot.
    pub fn resolve(self, value: SharedStateValue) -> HubResult<()> {
        {
            let mut states = self
                .api
                .shared
                .states
                .write()
                .map_err(|_| lock_err("shared_states"))?;
            let history = states
                .get_mut(&self.api.name)
                .ok_or(SharedStateError::NoPendingState { version: self.version })?;
            history.resolve_pending(self.version, value)?;
        }
        debug!(extension = %self.api.name, version = self.version, "pending shared state resolved");
        self.api.announce_state_change()
    }
}
