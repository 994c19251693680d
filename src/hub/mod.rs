//! Event hub subsystem.
//!
//! The hub owns registered extensions, routes events to their listeners on a
//! single worker thread and keeps every extension's versioned shared state.

/// Extension-facing handle.
pub mod api;
/// Hub worker and configuration.
pub mod dispatcher;
/// Extension trait.
pub mod extension;

pub use api::{ExtensionApi, SharedStateResolver, STATE_OWNER_KEY};
pub use dispatcher::{EventHub, EventHubConfig};
pub use extension::{EventListener, Extension};
