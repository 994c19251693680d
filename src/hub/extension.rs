//! Extension trait and listener records.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::event::{Event, EventSource, EventType};

use super::api::ExtensionApi;

/// A listener callback. Runs on the hub worker thread.
pub type EventListener = Arc<dyn Fn(&Event) + Send + Sync>;

/// A unit of functionality plugged into the hub.
///
/// Extensions attach their listeners in [`Extension::on_registered`]; the
/// [`ExtensionApi`] handle may be cloned into listener closures.
pub trait Extension: Send {
    /// Unique name. Shared state is published under this name.
    fn name(&self) -> &str;

    /// Display name used in logs.
    fn friendly_name(&self) -> &str {
        self.name()
    }

    /// Optional version string.
    fn version(&self) -> Option<&str> {
        None
    }

    /// Called once on the hub worker thread after registration.
    fn on_registered(&mut self, api: &ExtensionApi);

    /// Called when the extension is removed or the hub shuts down.
    fn on_unregistered(&mut self) {}
}

#[derive(Clone)]
pub(crate) struct ListenerEntry {
    pub event_type: EventType,
    pub source: EventSource,
    pub listener: EventListener,
}

impl fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("event_type", &self.event_type)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

pub(crate) type ListenerList = Arc<Mutex<Vec<ListenerEntry>>>;

/// Worker-side record of a registered extension.
pub(crate) struct ExtensionEntry {
    pub name: String,
    pub extension: Box<dyn Extension>,
    pub listeners: ListenerList,
}

impl ExtensionEntry {
    /// Listeners whose filter accepts `event`, in registration order.
    pub fn matching(&self, event: &Event) -> Vec<EventListener> {
        let guard = self
            .listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard
            .iter()
            .filter(|l| event.matches(&l.event_type, &l.source))
            .map(|l| Arc::clone(&l.listener))
            .collect()
    }

    /// Drops every listener, breaking reference cycles through captured API handles.
    pub fn clear_listeners(&self) {
        self.listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}
