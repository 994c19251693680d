//! The monitor extension.

use std::sync::Arc;

use tracing::trace;

use crate::configuration::CONFIGURATION_STATE_OWNER;
use crate::event::{Event, EventSource, EventType};
use crate::hub::{Extension, ExtensionApi};
use crate::shared_state::SharedStateResolution;

use super::context::MonitorContext;

/// Name the monitor registers under.
pub const MONITOR_EXTENSION_NAME: &str = "MonitorExtension";

/// What the monitor watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Type of the events to capture.
    pub capture_type: EventType,
    /// Source of the events to capture.
    pub capture_source: EventSource,
    /// Shared state namespace offered to the configuration callback.
    pub configuration_owner: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            capture_type: EventType::CAMPAIGN,
            capture_source: EventSource::RESPONSE_CONTENT,
            configuration_owner: CONFIGURATION_STATE_OWNER.to_string(),
        }
    }
}

/// Test extension that records registration events and reports the
/// available configuration.
#[derive(Debug)]
pub struct MonitorExtension {
    ctx: Arc<MonitorContext>,
    config: MonitorConfig,
}

impl MonitorExtension {
    #[must_use]
    #[allow(missing_docs)]
    pub fn new(ctx: Arc<MonitorContext>) -> Self {
        Self::with_config(ctx, MonitorConfig::default())
    }

    #[must_use]
    #[allow(missing_docs)]
    pub fn with_config(ctx: Arc<MonitorContext>, config: MonitorConfig) -> Self {
        Self { ctx, config }
    }
}

impl Extension for MonitorExtension {
    fn name(&self) -> &str {
        MONITOR_EXTENSION_NAME
    }

    fn on_registered(&mut self, api: &ExtensionApi) {
        let ctx = Arc::clone(&self.ctx);
        let owner = self.config.configuration_owner.clone();
        let handle = api.clone();
        api.register_event_listener(EventType::WILDCARD, EventSource::WILDCARD, move |event| {
            on_event(&ctx, &handle, &owner, event);
        });

        let ctx = Arc::clone(&self.ctx);
        api.register_event_listener(
            self.config.capture_type.clone(),
            self.config.capture_source.clone(),
            move |event| on_registration_event(&ctx, event),
        );
    }
}

fn on_event(ctx: &MonitorContext, api: &ExtensionApi, owner: &str, event: &Event) {
    let configuration = api
        .get_shared_state(owner, Some(event), false, SharedStateResolution::LastSet)
        .and_then(|result| result.value);

    // Absent configuration means "not yet".
    if let Some(configuration) = configuration {
        ctx.offer_configuration(&configuration);
    }
}

fn on_registration_event(ctx: &MonitorContext, event: &Event) {
    trace!(number = event.number, name = %event.name, "captured registration event");
    ctx.capture(event.clone());
}
