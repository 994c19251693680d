//! Test monitor for hub integration tests.
//!
//! The monitor extension listens to every event on the hub. It reports the
//! non-empty configuration shared state to a harness callback and
//! records every event of one topic (campaign response content by default)
//! in arrival order.

/// Harness-owned state.
pub mod context;
/// The extension itself.
pub mod extension;

pub use context::{CallbackPolicy, CapturedEvents, ConfigurationCallback, MonitorContext};
pub use extension::{MonitorConfig, MonitorExtension, MONITOR_EXTENSION_NAME};
