// src/error.rs
//! Unified error handling for the EMG session core
//!
//! Every fallible operation in the crate returns [`EmgResult`]. Collaborator
//! failures (device transport, persistence, configuration) keep their own
//! error types and are wrapped into [`EmgError`] at the boundary, so callers
//! can match on the category and still reach the underlying cause.

use thiserror::Error;

/// Unified error type for the session core
#[derive(Debug, Clone, Error)]
pub enum EmgError {
    /// Malformed or missing required input (metadata, phase definition,
    /// zero-phase session). Never retried automatically.
    #[error("[VALIDATION] Invalid {field}: {reason}")]
    Validation {
        field: String,
        reason: String,
    },

    /// Operation attempted in a state that forbids it
    #[error("[STATE] Cannot {operation} while {state}")]
    InvalidState {
        operation: String,
        state: String,
    },

    /// Device communication failure
    #[error("[TRANSPORT] {0}")]
    Transport(#[from] TransportError),

    /// Persistence failure; the session stays in memory
    #[error("[STORAGE] {0}")]
    Storage(#[from] StorageError),

    /// Configuration loading or consistency failure
    #[error("[CONFIG] {0}")]
    Configuration(#[from] ConfigError),
}

/// Device transport errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("Device is not connected")]
    NotConnected,
    #[error("Device rejected command: {0}")]
    CommandRejected(String),
    #[error("Notification stream closed unexpectedly")]
    StreamClosed,
    #[error("Transport I/O error: {0}")]
    Io(String),
    #[error("Transport configuration error: {0}")]
    Configuration(String),
}

/// Persistence errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(String),
    #[error("Session serialization error: {0}")]
    Serialization(String),
    #[error("Session '{0}' is already stored")]
    Duplicate(String),
    #[error("Session '{0}' not found")]
    NotFound(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Configuration loading errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
    #[error("Configuration parse error: {0}")]
    Parse(String),
    #[error("Configuration validation errors: {}", .0.join("; "))]
    Invalid(Vec<String>),
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Result type alias for session-core operations
pub type EmgResult<T> = Result<T, EmgError>;

impl EmgError {
    /// Shorthand for a validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EmgError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an invalid-state error
    pub fn invalid_state(operation: impl Into<String>, state: impl Into<String>) -> Self {
        EmgError::InvalidState {
            operation: operation.into(),
            state: state.into(),
        }
    }

    /// Human-readable notification text for the presentation layer
    pub fn user_message(&self) -> String {
        match self {
            EmgError::Validation { field, reason } => {
                format!("Please check {}: {}", field.replace('_', " "), reason)
            }
            EmgError::InvalidState { operation, .. } => {
                format!("Cannot {} right now", operation)
            }
            EmgError::Transport(err) => format!("Device communication failed: {}", err),
            EmgError::Storage(err) => format!("Failed to save sessions: {}", err),
            EmgError::Configuration(err) => format!("Invalid configuration: {}", err),
        }
    }

    /// Whether a caller may reasonably retry the operation.
    /// The core itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EmgError::Transport(_) | EmgError::Storage(_))
    }
}

/// Error builder carrying the component/operation context
pub struct EmgErrorBuilder {
    component: String,
    operation: String,
}

impl EmgErrorBuilder {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn validation(self, field: &str, reason: &str) -> EmgError {
        EmgError::Validation {
            field: field.to_string(),
            reason: format!("{} ({}::{})", reason, self.component, self.operation),
        }
    }

    pub fn invalid_state(self, state: &str) -> EmgError {
        EmgError::InvalidState {
            operation: format!("{} {}", self.operation, self.component),
            state: state.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EmgError::validation("subject_id", "must not be empty");
        let display = format!("{}", err);
        assert!(display.contains("[VALIDATION]"));
        assert!(display.contains("subject_id"));

        let err = EmgError::invalid_state("start phase", "collecting");
        assert_eq!(format!("{}", err), "[STATE] Cannot start phase while collecting");
    }

    #[test]
    fn test_error_conversion() {
        let err: EmgError = TransportError::StreamClosed.into();
        assert!(matches!(err, EmgError::Transport(TransportError::StreamClosed)));

        let err: EmgError = StorageError::Duplicate("emg-001".to_string()).into();
        assert!(format!("{}", err).contains("emg-001"));
    }

    #[test]
    fn test_user_message_and_retry() {
        let err = EmgError::validation("muscle_group", "must not be empty");
        assert_eq!(err.user_message(), "Please check muscle group: must not be empty");
        assert!(!err.is_retryable());

        let err: EmgError = TransportError::NotConnected.into();
        assert!(err.is_retryable());
        assert!(err.user_message().starts_with("Device communication failed"));
    }

    #[test]
    fn test_error_builder() {
        let err = EmgErrorBuilder::new("session", "attach_phase").invalid_state("finalized");
        match err {
            EmgError::InvalidState { operation, state } => {
                assert_eq!(operation, "attach_phase session");
                assert_eq!(state, "finalized");
            }
            _ => panic!("Expected invalid state error"),
        }
    }

    #[test]
    fn test_config_error_lists_all_problems() {
        let err = ConfigError::Invalid(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(format!("{}", err), "Configuration validation errors: a; b");
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EmgError>();
    }
}
