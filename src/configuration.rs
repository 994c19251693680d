//! Configuration extension.
//!
//! Owns the `com.adobe.module.configuration` shared state. Update requests
//! are merged into the current configuration, republished as shared state at
//! the request event and answered with a response event.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{json, Value};
use tracing::{debug, trace, warn};

use crate::error::ValidationError;
use crate::event::{Event, EventSource, EventType};
use crate::hub::{Extension, ExtensionApi};
use crate::shared_state::SharedStateValue;

/// Shared state namespace of the configuration extension.
pub const CONFIGURATION_STATE_OWNER: &str = "com.adobe.module.configuration";
/// Request key holding a map of configuration updates.
pub const CONFIG_UPDATE_KEY: &str = "config.update";
/// Request key that, when `true`, drops all updates.
pub const CONFIG_CLEAR_UPDATES_KEY: &str = "config.clearUpdates";

/// Builds a configuration update request.
///
/// Keys mapped to `null` are removed from the configuration.
///
/// # Examples
///
/// ```
/// use eventhub::configuration::configuration_update_event;
///
/// let event = configuration_update_event(serde_json::json!({"campaign.server": "example.com"})).unwrap();
/// assert!(event.data.contains_key("config.update"));
/// ```
pub fn configuration_update_event(update: Value) -> Result<Event, ValidationError> {
    if !update.is_object() {
        return Err(ValidationError::MissingField {
            field: CONFIG_UPDATE_KEY.to_string(),
        });
    }
    Event::builder(
        "Configuration Update",
        EventType::CONFIGURATION,
        EventSource::REQUEST_CONTENT,
    )
    .data(json!({ CONFIG_UPDATE_KEY: update }))
    .build()
}

/// Builds a request that resets the configuration to its initial value.
pub fn configuration_clear_updates_event() -> Result<Event, ValidationError> {
    Event::builder(
        "Clear Configuration Updates",
        EventType::CONFIGURATION,
        EventSource::REQUEST_CONTENT,
    )
    .data(json!({ CONFIG_CLEAR_UPDATES_KEY: true }))
    .build()
}

fn merge_update(current: &mut SharedStateValue, update: &SharedStateValue) {
    for (key, value) in update {
        if value.is_null() {
            current.remove(key);
        } else {
            current.insert(key.clone(), value.clone());
        }
    }
}

/// Extension publishing the configuration shared state.
#[derive(Debug, Default)]
pub struct ConfigurationExtension {
    initial: SharedStateValue,
}

impl ConfigurationExtension {
    /// Starts with an empty configuration; nothing is published until the first update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `initial`, published on registration when non-empty.
    #[must_use]
    pub fn with_initial(initial: SharedStateValue) -> Self {
        Self { initial }
    }
}

impl Extension for ConfigurationExtension {
    fn name(&self) -> &str {
        CONFIGURATION_STATE_OWNER
    }

    fn friendly_name(&self) -> &str {
        "Configuration"
    }

    fn on_registered(&mut self, api: &ExtensionApi) {
        if !self.initial.is_empty() {
            if let Err(e) = api.create_shared_state(self.initial.clone(), None) {
                warn!(error = %e, "failed to publish initial configuration");
            }
        }

        let current = Arc::new(Mutex::new(self.initial.clone()));
        let initial = self.initial.clone();
        let handle = api.clone();
        api.register_event_listener(
            EventType::CONFIGURATION,
            EventSource::REQUEST_CONTENT,
            move |event| handle_request(&handle, &current, &initial, event),
        );
    }
}

fn handle_request(
    api: &ExtensionApi,
    current: &Mutex<SharedStateValue>,
    initial: &SharedStateValue,
    event: &Event,
) {
    let snapshot = {
        let mut config = current.lock().unwrap_or_else(PoisonError::into_inner);
        if event.data.get(CONFIG_CLEAR_UPDATES_KEY) == Some(&Value::Bool(true)) {
            *config = initial.clone();
        } else if let Some(Value::Object(update)) = event.data.get(CONFIG_UPDATE_KEY) {
            merge_update(&mut config, update);
        } else {
            trace!(event = %event.name, "ignoring configuration request without update");
            return;
        }
        config.clone()
    };

    debug!(keys = snapshot.len(), "configuration updated");
    if let Err(e) = api.create_shared_state(snapshot.clone(), Some(event)) {
        warn!(error = %e, "failed to publish configuration");
        return;
    }

    match Event::builder(
        "Configuration Response",
        EventType::CONFIGURATION,
        EventSource::RESPONSE_CONTENT,
    )
    .data_map(snapshot)
    .in_response_to(event)
    .build()
    {
        Ok(response) => api.dispatch(response),
        Err(e) => warn!(error = %e, "failed to build configuration response"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(v: Value) -> SharedStateValue {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_merge_overrides_and_removes() {
        let mut current = map(json!({"a": 1, "b": 2}));
        merge_update(&mut current, &map(json!({"b": 3, "a": null, "c": "x"})));
        assert_eq!(current, map(json!({"b": 3, "c": "x"})));
    }

    #[test]
    fn test_update_event_requires_object() {
        assert!(configuration_update_event(json!("nope")).is_err());
        let event = configuration_update_event(json!({"k": "v"})).unwrap();
        assert_eq!(event.event_type, EventType::CONFIGURATION);
        assert_eq!(event.data[CONFIG_UPDATE_KEY], json!({"k": "v"}));
    }

    #[test]
    fn test_clear_event_payload() {
        let event = configuration_clear_updates_event().unwrap();
        assert_eq!(event.data[CONFIG_CLEAR_UPDATES_KEY], Value::Bool(true));
    }
}
