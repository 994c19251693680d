//! Error types for the event hub.
//!
//! All errors are strongly typed using thiserror so callers can match on
//! specific conditions. None of these surface through the monitor extension,
//! which treats every hub failure as "not yet".

use thiserror::Error;

/// Validation errors raised while building events or registering extensions.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Event name cannot be empty")]
    EmptyEventName,

    #[error("Extension name cannot be empty")]
    EmptyExtensionName,

    #[error("Required field '{field}' is missing")]
    MissingField {
        field: String,
    },
}

/// Errors from versioned shared state bookkeeping.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedStateError {
    #[error("Shared state version {version} is not newer than the latest version {latest}")]
    VersionNotIncreasing {
        version: u64,
        latest: u64,
    },

    #[error("No pending shared state at version {version}")]
    NoPendingState {
        version: u64,
    },
}

/// Errors raised while the hub executes a request.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Extension '{name}' is already registered")]
    DuplicateExtension {
        name: String,
    },

    #[error("Extension not found: {name}")]
    ExtensionNotFound {
        name: String,
    },

    #[error("Hub channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Extension '{name}' panicked during {phase}")]
    ExtensionPanicked {
        name: String,
        phase: String,
    },
}

/// Top-level error type for the hub.
#[allow(missing_docs)]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HubError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Shared state error: {0}")]
    SharedState(#[from] SharedStateError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl HubError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a disconnected-channel error for the given channel path.
    #[must_use]
    pub(crate) fn disconnected(path: &str) -> Self {
        Self::Execution(ExecutionError::Disconnected {
            path: path.to_string(),
        })
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a shared state error.
    #[must_use]
    pub const fn is_shared_state(&self) -> bool {
        matches!(self, Self::SharedState(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if the hub worker has gone away.
    #[must_use]
    pub const fn is_disconnected(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::Disconnected { .. }))
    }
}

/// Result type alias for hub operations.
pub type HubResult<T> = Result<T, HubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_message() {
        let err = ValidationError::MissingField {
            field: "source".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("source"));
        assert!(msg.contains("missing"));
    }

    #[test]
    fn test_shared_state_error_message() {
        let err = SharedStateError::VersionNotIncreasing { version: 3, latest: 7 };
        let msg = format!("{err}");
        assert!(msg.contains('3'));
        assert!(msg.contains('7'));
    }

    #[test]
    fn test_execution_error_duplicate() {
        let err = ExecutionError::DuplicateExtension {
            name: "MonitorExtension".to_string(),
        };
        assert!(format!("{err}").contains("already registered"));
    }

    #[test]
    fn test_hub_error_from_validation() {
        let err: HubError = ValidationError::EmptyEventName.into();
        assert!(err.is_validation());
        assert!(!err.is_execution());
    }

    #[test]
    fn test_hub_error_from_shared_state() {
        let err: HubError = SharedStateError::NoPendingState { version: 1 }.into();
        assert!(err.is_shared_state());
    }

    #[test]
    fn test_hub_error_disconnected() {
        let err = HubError::disconnected("hub_control");
        assert!(err.is_execution());
        assert!(err.is_disconnected());
        assert!(format!("{err}").contains("hub_control"));
    }

    #[test]
    fn test_hub_error_internal() {
        let err = HubError::internal("unexpected state");
        assert!(err.is_internal());
        assert!(format!("{err}").contains("unexpected state"));
    }
}
