//! Event hub worker.
//!
//! This module owns extension registrations and delivers events to their
//! listeners. Every message goes through one bounded channel, so delivery is
//! serialized on the worker thread in enqueue order. Dispatch never blocks
//! the caller.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::error::{ExecutionError, HubError, HubResult, ValidationError};
use crate::event::{Event, EventId};

use super::api::{ExtensionApi, HubShared};
use super::extension::{Extension, ExtensionEntry};

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EventHubConfig {
    /// Max queued messages before dispatch starts dropping events.
    pub queue_capacity: usize,
    /// Name of the worker thread.
    pub worker_thread_name: String,
    /// Idle interval between sweeps of expired response listeners.
    pub sweep_interval_ms: u64,
}

impl Default for EventHubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            worker_thread_name: "eventhub-worker".to_string(),
            sweep_interval_ms: 50,
        }
    }
}

type ResponseCallback = Box<dyn FnOnce(&Event) + Send>;

pub(crate) enum HubMsg {
    Register {
        extension: Box<dyn Extension>,
        reply: Sender<HubResult<()>>,
    },
    Unregister {
        name: String,
        reply: Sender<HubResult<()>>,
    },
    Event(Event),
    ResponseListener {
        trigger: EventId,
        expires_at: Instant,
        callback: ResponseCallback,
    },
    Flush {
        reply: Sender<()>,
    },
}

struct ResponseEntry {
    trigger: EventId,
    expires_at: Instant,
    callback: ResponseCallback,
}

/// Non-blocking enqueue shared by the hub and extension handles.
pub(crate) fn enqueue_event(tx: &Sender<HubMsg>, dropped: &AtomicU64, event: Event) {
    match tx.try_send(HubMsg::Event(event)) {
        Ok(()) => {}
        Err(TrySendError::Full(HubMsg::Event(event)) | TrySendError::Disconnected(HubMsg::Event(event))) => {
            dropped.fetch_add(1, Ordering::Relaxed);
            warn!(event = %event.name, id = %event.id, "event dropped: hub queue unavailable");
        }
        Err(_) => {
            dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// In-process event hub.
///
/// Runs a dedicated worker thread. Extensions are registered on that thread
/// and all their listeners run there, one event at a time.
pub struct EventHub {
    tx: Sender<HubMsg>,
    // Dropping this sender disconnects the worker's shutdown receiver.
    shutdown_tx: Option<Sender<()>>,
    shared: Arc<HubShared>,
    dropped_events: Arc<AtomicU64>,
    join: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("shared", &self.shared)
            .field("dropped_events", &self.dropped_events)
            .finish_non_exhaustive()
    }
}

impl EventHub {
    /// Starts the hub worker.
    pub fn new(cfg: EventHubConfig) -> HubResult<Self> {
        let (tx, rx) = bounded::<HubMsg>(cfg.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let shared = Arc::new(HubShared::default());
        let dropped_events = Arc::new(AtomicU64::new(0));

        let worker = Worker {
            shared: Arc::clone(&shared),
            tx: tx.clone(),
            dropped_events: Arc::clone(&dropped_events),
            extensions: Vec::new(),
            responses: Vec::new(),
            flushes: Vec::new(),
        };
        let sweep = Duration::from_millis(cfg.sweep_interval_ms.max(1));

        let join = thread::Builder::new()
            .name(cfg.worker_thread_name.clone())
            .spawn(move || worker.run(rx, shutdown_rx, sweep))
            .map_err(|e| HubError::internal(format!("failed to spawn hub worker: {e}")))?;

        debug!(thread = %cfg.worker_thread_name, "event hub started");

        Ok(Self {
            tx,
            shutdown_tx: Some(shutdown_tx),
            shared,
            dropped_events,
            join: Some(join),
        })
    }

    /// Registers an extension and waits until its `on_registered` has run.
    ///
    /// Must not be called from a listener: the worker would wait on itself.
    pub fn register_extension(&self, extension: Box<dyn Extension>) -> HubResult<()> {
        if extension.name().trim().is_empty() {
            return Err(ValidationError::EmptyExtensionName.into());
        }

        let (reply_tx, reply_rx) = bounded::<HubResult<()>>(1);
        self.tx
            .send(HubMsg::Register {
                extension,
                reply: reply_tx,
            })
            .map_err(|_| HubError::disconnected("hub_control"))?;

        reply_rx.recv().map_err(|_| HubError::disconnected("hub_control"))?
    }

    /// Removes an extension, its listeners and its shared state.
    ///
    /// Must not be called from a listener: the worker would wait on itself.
    pub fn unregister_extension(&self, name: &str) -> HubResult<()> {
        let (reply_tx, reply_rx) = bounded::<HubResult<()>>(1);
        self.tx
            .send(HubMsg::Unregister {
                name: name.to_string(),
                reply: reply_tx,
            })
            .map_err(|_| HubError::disconnected("hub_control"))?;

        reply_rx.recv().map_err(|_| HubError::disconnected("hub_control"))?
    }

    /// Non-blocking dispatch. Dropped events are counted in [`EventHub::dropped_events`].
    pub fn dispatch(&self, event: Event) {
        enqueue_event(&self.tx, &self.dropped_events, event);
    }

    /// Dispatches `event` and calls `callback` with the first response to it.
    ///
    /// The callback is discarded without running if no response arrives
    /// within `timeout`.
    pub fn dispatch_with_response<F>(&self, event: Event, timeout: Duration, callback: F) -> HubResult<()>
    where
        F: FnOnce(&Event) + Send + 'static,
    {
        self.tx
            .send(HubMsg::ResponseListener {
                trigger: event.id,
                expires_at: Instant::now() + timeout,
                callback: Box::new(callback),
            })
            .map_err(|_| HubError::disconnected("hub_control"))?;
        self.dispatch(event);
        Ok(())
    }

    /// Blocks until the hub is idle: every message enqueued before this call,
    /// and every event those messages caused, has been processed.
    ///
    /// Must not be called from a listener: the worker would wait on itself.
    pub fn flush(&self) -> HubResult<()> {
        let (reply_tx, reply_rx) = bounded::<()>(1);
        self.tx
            .send(HubMsg::Flush { reply: reply_tx })
            .map_err(|_| HubError::disconnected("hub_control"))?;
        reply_rx.recv().map_err(|_| HubError::disconnected("hub_control"))
    }

    /// Names of registered extensions, in registration order.
    #[must_use]
    pub fn registered_extensions(&self) -> Vec<String> {
        self.shared.extensions()
    }

    /// Number of the most recently delivered event (0 before the first).
    #[must_use]
    pub fn last_event_number(&self) -> u64 {
        self.shared.last_event_number()
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }
}

impl Drop for EventHub {
    fn drop(&mut self) {
        // The worker holds a message sender for extension handles, so only the
        // shutdown channel is guaranteed to disconnect, even with a full queue.
        drop(self.shutdown_tx.take());

        let Some(handle) = self.join.take() else {
            return;
        };

        // Dropped from inside a listener: joining would wait on ourselves.
        if handle.thread().id() == thread::current().id() {
            return;
        }

        if handle.join().is_err() {
            warn!("event hub worker panicked");
        }
    }
}

struct Worker {
    shared: Arc<HubShared>,
    tx: Sender<HubMsg>,
    dropped_events: Arc<AtomicU64>,
    extensions: Vec<ExtensionEntry>,
    responses: Vec<ResponseEntry>,
    flushes: Vec<Sender<()>>,
}

impl Worker {
    fn run(mut self, rx: Receiver<HubMsg>, shutdown_rx: Receiver<()>, sweep: Duration) {
        let mut closed = false;

        while !closed {
            select! {
                recv(rx) -> msg => match msg {
                    Ok(msg) => self.handle(msg),
                    Err(_) => closed = true,
                },
                recv(shutdown_rx) -> _ => {
                    // Deliver what was enqueued before the hub was dropped.
                    for _ in 0..rx.len() {
                        match rx.try_recv() {
                            Ok(msg) => self.handle(msg),
                            Err(_) => break,
                        }
                    }
                    closed = true;
                }
                default(sweep) => self.sweep_responses(),
            }

            // Follow-up events enqueued by listeners count as outstanding work.
            if !self.flushes.is_empty() && (rx.is_empty() || closed) {
                for reply in self.flushes.drain(..) {
                    let _ = reply.send(());
                }
            }
        }

        self.shutdown();
    }

    fn handle(&mut self, msg: HubMsg) {
        match msg {
            HubMsg::Register { extension, reply } => {
                let _ = reply.send(self.register(extension));
            }
            HubMsg::Unregister { name, reply } => {
                let _ = reply.send(self.unregister(&name));
            }
            HubMsg::Event(event) => self.deliver(event),
            HubMsg::ResponseListener { trigger, expires_at, callback } => {
                self.responses.push(ResponseEntry { trigger, expires_at, callback });
            }
            HubMsg::Flush { reply } => self.flushes.push(reply),
        }
    }

    fn register(&mut self, mut extension: Box<dyn Extension>) -> HubResult<()> {
        let name = extension.name().to_string();
        if self.extensions.iter().any(|e| e.name == name) {
            return Err(ExecutionError::DuplicateExtension { name }.into());
        }

        let listeners = Arc::new(Mutex::new(Vec::new()));
        let api = ExtensionApi::new(
            name.clone(),
            Arc::clone(&listeners),
            Arc::clone(&self.shared),
            self.tx.clone(),
            Arc::clone(&self.dropped_events),
        );

        self.shared.add_extension(&name);
        if catch_unwind(AssertUnwindSafe(|| extension.on_registered(&api))).is_err() {
            warn!(extension = %name, "extension panicked during registration");
            listeners
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clear();
            self.shared.remove_extension(&name);
            return Err(ExecutionError::ExtensionPanicked {
                name,
                phase: "registration".to_string(),
            }
            .into());
        }

        debug!(
            extension = %name,
            friendly_name = extension.friendly_name(),
            version = extension.version().unwrap_or("-"),
            "extension registered"
        );
        self.extensions.push(ExtensionEntry {
            name,
            extension,
            listeners,
        });
        Ok(())
    }

    fn unregister(&mut self, name: &str) -> HubResult<()> {
        let Some(pos) = self.extensions.iter().position(|e| e.name == name) else {
            return Err(ExecutionError::ExtensionNotFound {
                name: name.to_string(),
            }
            .into());
        };

        let mut entry = self.extensions.remove(pos);
        Self::teardown(&mut entry);
        self.shared.remove_extension(name);
        debug!(extension = %name, "extension unregistered");
        Ok(())
    }

    fn teardown(entry: &mut ExtensionEntry) {
        entry.clear_listeners();
        if catch_unwind(AssertUnwindSafe(|| entry.extension.on_unregistered())).is_err() {
            warn!(extension = %entry.name, "extension panicked during unregistration");
        }
    }

    fn deliver(&mut self, mut event: Event) {
        let number = self.shared.next_event_number();
        event.number = Some(number);
        trace!(
            number,
            name = %event.name,
            event_type = %event.event_type,
            source = %event.source,
            "delivering event"
        );

        if event.response_id.is_some() {
            self.sweep_responses();
            if let Some(pos) = self.responses.iter().position(|r| event.is_response_to(r.trigger)) {
                let entry = self.responses.remove(pos);
                let callback = entry.callback;
                if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                    warn!(number, "response callback panicked");
                }
            }
        }

        for entry in &self.extensions {
            for listener in entry.matching(&event) {
                if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                    warn!(extension = %entry.name, number, "listener panicked");
                }
            }
            self.shared.mark_processed(&entry.name, number);
        }
    }

    fn sweep_responses(&mut self) {
        let now = Instant::now();
        let before = self.responses.len();
        self.responses.retain(|r| r.expires_at > now);
        let expired = before - self.responses.len();
        if expired > 0 {
            trace!(expired, "response listeners expired");
        }
    }

    fn shutdown(&mut self) {
        for entry in &mut self.extensions {
            Self::teardown(entry);
        }
        for entry in self.extensions.drain(..) {
            self.shared.remove_extension(&entry.name);
        }
        self.responses.clear();
        debug!("event hub stopped");
    }
}
