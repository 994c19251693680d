//! Events, event types and event sources.
//!
//! An event is addressed by a `(type, source)` pair. Listeners filter on that
//! pair, with a wildcard value on either side matching anything. Type and
//! source names compare case-insensitively.

use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ValidationError;

/// Unique identifier for an event.
///
/// # Examples
///
/// ```
/// use eventhub::EventId;
///
/// let id = EventId::new();
/// assert_ne!(id, EventId::new());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! event_name_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub struct $name(Cow<'static, str>);

        impl $name {
            /// Creates a value from any string, normalizing it to lowercase.
            #[must_use]
            pub fn new(name: impl AsRef<str>) -> Self {
                Self(Cow::Owned(name.as_ref().trim().to_ascii_lowercase()))
            }

            /// Returns the normalized name.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true for the wildcard value.
            #[must_use]
            pub fn is_wildcard(&self) -> bool {
                *self == Self::WILDCARD
            }

            /// Returns true if `filter` is the wildcard or equal to `self`.
            #[must_use]
            pub fn accepted_by(&self, filter: &Self) -> bool {
                filter.is_wildcard() || filter == self
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> Self {
                v.0.into_owned()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

event_name_type! {
    /// Category of an event, e.g. configuration or campaign.
    EventType
}

event_name_type! {
    /// Origin of an event within its type, e.g. request or response content.
    EventSource
}

#[allow(missing_docs)]
impl EventType {
    pub const WILDCARD: Self = Self(Cow::Borrowed("com.adobe.eventtype._wildcard_"));
    pub const CAMPAIGN: Self = Self(Cow::Borrowed("com.adobe.eventtype.campaign"));
    pub const CONFIGURATION: Self = Self(Cow::Borrowed("com.adobe.eventtype.configuration"));
    pub const HUB: Self = Self(Cow::Borrowed("com.adobe.eventtype.hub"));
    pub const GENERIC_TRACK: Self = Self(Cow::Borrowed("com.adobe.eventtype.generic.track"));
    pub const LIFECYCLE: Self = Self(Cow::Borrowed("com.adobe.eventtype.lifecycle"));
}

#[allow(missing_docs)]
impl EventSource {
    pub const WILDCARD: Self = Self(Cow::Borrowed("com.adobe.eventsource._wildcard_"));
    pub const REQUEST_CONTENT: Self = Self(Cow::Borrowed("com.adobe.eventsource.requestcontent"));
    pub const RESPONSE_CONTENT: Self = Self(Cow::Borrowed("com.adobe.eventsource.responsecontent"));
    pub const REQUEST_IDENTITY: Self = Self(Cow::Borrowed("com.adobe.eventsource.requestidentity"));
    pub const SHARED_STATE: Self = Self(Cow::Borrowed("com.adobe.eventsource.sharedstate"));
    pub const BOOTED: Self = Self(Cow::Borrowed("com.adobe.eventsource.booted"));
}

/// An event travelling through the hub.
///
/// Events are immutable once built; the hub only stamps the sequence
/// `number` when it delivers the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique id.
    pub id: EventId,
    /// Human readable name.
    pub name: String,
    /// Event type.
    pub event_type: EventType,
    /// Event source.
    pub source: EventSource,
    /// Payload.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Id of the event this one answers, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<EventId>,
    /// Sequence number assigned by the hub on delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
}

impl Event {
    /// Starts building an event.
    ///
    /// # Examples
    ///
    /// ```
    /// use eventhub::{Event, EventSource, EventType};
    ///
    /// let event = Event::builder("Campaign Response", EventType::CAMPAIGN, EventSource::RESPONSE_CONTENT)
    ///     .data(serde_json::json!({"registered": true}))
    ///     .build()
    ///     .unwrap();
    /// assert!(event.matches(&EventType::CAMPAIGN, &EventSource::WILDCARD));
    /// ```
    #[must_use]
    pub fn builder(
        name: impl Into<String>,
        event_type: impl Into<EventType>,
        source: impl Into<EventSource>,
    ) -> EventBuilder {
        EventBuilder::new(name, event_type, source)
    }

    /// Returns true if the event passes a `(type, source)` filter.
    #[must_use]
    pub fn matches(&self, event_type: &EventType, source: &EventSource) -> bool {
        self.event_type.accepted_by(event_type) && self.source.accepted_by(source)
    }

    /// Returns true if this event answers `trigger`.
    #[must_use]
    pub fn is_response_to(&self, trigger: EventId) -> bool {
        self.response_id == Some(trigger)
    }
}

/// Builder for [`Event`].
#[derive(Debug, Clone)]
pub struct EventBuilder {
    name: String,
    event_type: EventType,
    source: EventSource,
    data: Map<String, Value>,
    response_id: Option<EventId>,
}

impl EventBuilder {
    /// Creates a builder for the given name, type and source.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        event_type: impl Into<EventType>,
        source: impl Into<EventSource>,
    ) -> Self {
        Self {
            name: name.into(),
            event_type: event_type.into(),
            source: source.into(),
            data: Map::new(),
            response_id: None,
        }
    }

    /// Sets the payload. Non-object JSON values are ignored.
    #[must_use]
    pub fn data(mut self, data: Value) -> Self {
        if let Value::Object(map) = data {
            self.data = map;
        }
        self
    }

    /// Sets the payload from a map.
    #[must_use]
    pub fn data_map(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    /// Marks the event as a response to `trigger`.
    #[must_use]
    pub fn in_response_to(mut self, trigger: &Event) -> Self {
        self.response_id = Some(trigger.id);
        self
    }

    /// Builds the event.
    pub fn build(self) -> Result<Event, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyEventName);
        }

        Ok(Event {
            id: EventId::new(),
            name: self.name,
            event_type: self.event_type,
            source: self.source,
            data: self.data,
            timestamp: Utc::now(),
            response_id: self.response_id,
            number: None,
        })
    }
}
