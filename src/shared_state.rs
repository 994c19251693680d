//! Versioned shared state published by extensions.
//!
//! Every extension owns one namespace of shared state. Each entry is keyed by
//! the number of the event it was published for, so a reader resolving
//! against event `n` only sees what existed at or before `n`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::SharedStateError;

/// The data carried by a shared state entry.
pub type SharedStateValue = Map<String, Value>;

/// How to pick an entry when resolving shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedStateResolution {
    /// Newest entry at or before the requested version, pending or not.
    Any,
    /// Newest entry at or before the requested version that has been set.
    LastSet,
}

/// Status of a resolved shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedStateStatus {
    /// A value is available.
    Set,
    /// The newest entry is still being computed.
    Pending,
    /// Nothing has been published.
    None,
}

/// Result of a shared state lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedStateResult {
    /// Resolution status.
    pub status: SharedStateStatus,
    /// The newest set value visible to the request, if any.
    pub value: Option<SharedStateValue>,
}

impl SharedStateResult {
    pub(crate) const fn none() -> Self {
        Self {
            status: SharedStateStatus::None,
            value: None,
        }
    }

    /// Returns true when the status is [`SharedStateStatus::Set`].
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.status == SharedStateStatus::Set
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Entry {
    Set(SharedStateValue),
    Pending,
}

/// Version-ordered history of one namespace.
#[derive(Debug, Default, Clone)]
pub struct SharedStates {
    entries: BTreeMap<u64, Entry>,
}

impl SharedStates {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest version, if anything was published.
    #[must_use]
    pub fn latest_version(&self) -> Option<u64> {
        self.entries.keys().next_back().copied()
    }

    /// Returns true if nothing was ever published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_increasing(&self, version: u64) -> Result<(), SharedStateError> {
        match self.latest_version() {
            Some(latest) if version <= latest => {
                Err(SharedStateError::VersionNotIncreasing { version, latest })
            }
            _ => Ok(()),
        }
    }

    /// Publishes `value` at `version`.
    pub fn set(&mut self, version: u64, value: SharedStateValue) -> Result<(), SharedStateError> {
        self.check_increasing(version)?;
        self.entries.insert(version, Entry::Set(value));
        Ok(())
    }

    /// Reserves `version` for a value that will be resolved later.
    pub fn add_pending(&mut self, version: u64) -> Result<(), SharedStateError> {
        self.check_increasing(version)?;
        self.entries.insert(version, Entry::Pending);
        Ok(())
    }

    /// Completes the pending entry at `version`.
    pub fn resolve_pending(
        &mut self,
        version: u64,
        value: SharedStateValue,
    ) -> Result<(), SharedStateError> {
        match self.entries.get_mut(&version) {
            Some(entry) if *entry == Entry::Pending => {
                *entry = Entry::Set(value);
                Ok(())
            }
            _ => Err(SharedStateError::NoPendingState { version }),
        }
    }

    /// Resolves the state visible at `version`.
    #[must_use]
    pub fn resolve(&self, version: u64, resolution: SharedStateResolution) -> SharedStateResult {
        let mut visible = self.entries.range(..=version).rev();

        let last_set = || {
            self.entries
                .range(..=version)
                .rev()
                .find_map(|(_, e)| match e {
                    Entry::Set(v) => Some(v.clone()),
                    Entry::Pending => None,
                })
        };

        match resolution {
            SharedStateResolution::Any => match visible.next() {
                None => SharedStateResult::none(),
                Some((_, Entry::Set(v))) => SharedStateResult {
                    status: SharedStateStatus::Set,
                    value: Some(v.clone()),
                },
                Some((_, Entry::Pending)) => SharedStateResult {
                    status: SharedStateStatus::Pending,
                    value: last_set(),
                },
            },
            SharedStateResolution::LastSet => match last_set() {
                Some(v) => SharedStateResult {
                    status: SharedStateStatus::Set,
                    value: Some(v),
                },
                None if visible.next().is_some() => SharedStateResult {
                    status: SharedStateStatus::Pending,
                    value: None,
                },
                None => SharedStateResult::none(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(v: Value) -> SharedStateValue {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_empty_resolves_to_none() {
        let states = SharedStates::new();
        let r = states.resolve(10, SharedStateResolution::Any);
        assert_eq!(r, SharedStateResult::none());
        let r = states.resolve(10, SharedStateResolution::LastSet);
        assert_eq!(r.status, SharedStateStatus::None);
    }

    #[test]
    fn test_versions_must_increase() {
        let mut states = SharedStates::new();
        states.set(2, map(json!({"a": 1}))).unwrap();
        let err = states.set(2, map(json!({"a": 2}))).unwrap_err();
        assert_eq!(err, SharedStateError::VersionNotIncreasing { version: 2, latest: 2 });
        assert!(states.add_pending(1).is_err());
    }

    #[test]
    fn test_resolution_respects_version() {
        let mut states = SharedStates::new();
        states.set(2, map(json!({"v": 2}))).unwrap();
        states.set(5, map(json!({"v": 5}))).unwrap();

        assert_eq!(states.resolve(1, SharedStateResolution::Any).status, SharedStateStatus::None);
        assert_eq!(
            states.resolve(4, SharedStateResolution::Any).value,
            Some(map(json!({"v": 2})))
        );
        assert_eq!(
            states.resolve(9, SharedStateResolution::LastSet).value,
            Some(map(json!({"v": 5})))
        );
    }

    #[test]
    fn test_any_reports_pending_with_previous_value() {
        let mut states = SharedStates::new();
        states.set(1, map(json!({"v": 1}))).unwrap();
        states.add_pending(3).unwrap();

        let any = states.resolve(3, SharedStateResolution::Any);
        assert_eq!(any.status, SharedStateStatus::Pending);
        assert_eq!(any.value, Some(map(json!({"v": 1}))));

        let last = states.resolve(3, SharedStateResolution::LastSet);
        assert_eq!(last.status, SharedStateStatus::Set);
        assert_eq!(last.value, Some(map(json!({"v": 1}))));
    }

    #[test]
    fn test_last_set_with_only_pending() {
        let mut states = SharedStates::new();
        states.add_pending(1).unwrap();
        let r = states.resolve(1, SharedStateResolution::LastSet);
        assert_eq!(r.status, SharedStateStatus::Pending);
        assert!(r.value.is_none());
    }

    #[test]
    fn test_resolve_pending() {
        let mut states = SharedStates::new();
        states.add_pending(4).unwrap();
        states.resolve_pending(4, map(json!({"done": true}))).unwrap();
        assert!(states.resolve(4, SharedStateResolution::Any).is_set());

        let err = states.resolve_pending(4, map(json!({}))).unwrap_err();
        assert_eq!(err, SharedStateError::NoPendingState { version: 4 });
        assert!(states.resolve_pending(7, map(json!({}))).is_err());
    }
}
