//! Error types for the relay

use thiserror::Error;

use crate::severity::Fatal;

/// Relay operation errors
#[derive(Debug, Error)]
pub enum RelayError {
    /// A worker is already active; only one may exist at a time
    #[error("Worker is already running")]
    AlreadyRunning,

    /// The operation needs an active worker
    #[error("Worker is not running")]
    NotRunning,

    /// The worker thread could not be spawned
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The controller side of the hand-off queue has gone away
    #[error("Controller is gone")]
    ControllerGone,

    /// A value request named a setting nobody registered
    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    /// A fatal severity unwound the engine
    #[error(transparent)]
    Fatal(#[from] Fatal),

    /// Engine-specific failure
    #[error("Engine error: {0}")]
    Engine(String),
}

/// Specialized Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    /// Create an engine failure
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Check whether this error carries a fatal severity
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::AlreadyRunning => "already_running",
            Self::NotRunning => "not_running",
            Self::Spawn(_) => "spawn",
            Self::ControllerGone => "controller_gone",
            Self::UnknownSetting(_) => "unknown_setting",
            Self::Fatal(_) => "fatal",
            Self::Engine(_) => "engine",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::severity::FatalReason;

    #[test]
    fn test_error_display() {
        assert_eq!(RelayError::AlreadyRunning.to_string(), "Worker is already running");
        assert_eq!(
            RelayError::UnknownSetting("boot-device".into()).to_string(),
            "Unknown setting: boot-device"
        );
    }

    #[test]
    fn test_controller_gone_category() {
        let err = RelayError::ControllerGone;
        assert_eq!(err.category(), "controller_gone");
        assert_eq!(err.to_string(), "Controller is gone");
    }

    #[test]
    fn test_fatal_conversion() {
        let fatal = Fatal::new(FatalReason::Policy, "[CPU  ]", "triple fault");
        let err: RelayError = fatal.into();
        assert!(err.is_fatal());
        assert_eq!(err.category(), "fatal");
        assert!(err.to_string().contains("triple fault"));
    }
}
