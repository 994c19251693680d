//! # eventhub - In-process event hub for SDK extensions
//!
//! Extensions register on an [`EventHub`], attach listeners for
//! `(type, source)` pairs and publish versioned shared state that other
//! extensions resolve against the event they are handling.
//!
//! ## Core Concepts
//!
//! - **Event**: a typed, sourced payload delivered to every matching listener
//! - **Extension**: a named unit that owns listeners and one shared state namespace
//! - **Shared state**: per-extension key-value snapshots versioned by event number
//! - **Monitor**: a test extension that captures one event topic and reports
//!   the available configuration
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use eventhub::configuration::{configuration_update_event, ConfigurationExtension};
//! use eventhub::monitor::{MonitorContext, MonitorExtension};
//! use eventhub::{EventHub, EventHubConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = EventHub::new(EventHubConfig::default())?;
//! let ctx = Arc::new(MonitorContext::new());
//! ctx.register_configuration_callback(|config| println!("configured: {config:?}"));
//!
//! hub.register_extension(Box::new(ConfigurationExtension::new()))?;
//! hub.register_extension(Box::new(MonitorExtension::new(Arc::clone(&ctx))))?;
//!
//! hub.dispatch(configuration_update_event(serde_json::json!({"campaign.server": "example.com"}))?);
//! hub.flush()?;
//! assert!(ctx.captured_events().is_empty());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod configuration;
pub mod error;
pub mod event;
pub mod hub;
pub mod monitor;
pub mod shared_state;

// Re-export primary types at crate root for convenience
pub use error::{ExecutionError, HubError, HubResult, SharedStateError, ValidationError};
pub use event::{Event, EventBuilder, EventId, EventSource, EventType};
pub use hub::{EventHub, EventHubConfig, Extension, ExtensionApi, SharedStateResolver};
pub use shared_state::{
    SharedStateResolution, SharedStateResult, SharedStateStatus, SharedStateValue, SharedStates,
};
