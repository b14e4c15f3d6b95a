//! Error types for the MSE player core

use thiserror::Error;

/// Main error type for player-level operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayerError {
    /// A source was attached while it already had a stream
    #[error("{track} source is already attached")]
    AlreadyAttached {
        /// Which track ("video" or "audio")
        track: String,
    },

    /// An operation needed an attached source
    #[error("{track} source is not attached")]
    NotAttached {
        /// Which track ("video" or "audio")
        track: String,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// The operation is not handled by this player
    #[error("Unsupported operation: {operation}")]
    Unsupported {
        /// Operation that was requested
        operation: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    Configuration {
        /// Offending field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// A background thread could not be started
    #[error("Failed to spawn {name} thread: {reason}")]
    ThreadSpawn {
        /// Thread name
        name: String,
        /// Failure reason
        reason: String,
    },
}

/// Result type alias for player operations
pub type PlayerResult<T> = Result<T, PlayerError>;

impl PlayerError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            PlayerError::AlreadyAttached { .. } => "ALREADY_ATTACHED",
            PlayerError::NotAttached { .. } => "NOT_ATTACHED",
            PlayerError::InvalidState { .. } => "INVALID_STATE",
            PlayerError::Unsupported { .. } => "UNSUPPORTED",
            PlayerError::Configuration { .. } => "INVALID_CONFIGURATION",
            PlayerError::ThreadSpawn { .. } => "THREAD_SPAWN_FAILED",
        }
    }

    /// Contract violations mean the caller misused the API and cannot be
    /// retried as-is.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            PlayerError::AlreadyAttached { .. } | PlayerError::Unsupported { .. }
        )
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            PlayerError::AlreadyAttached { .. } | PlayerError::Unsupported { .. } => {
                ErrorCategory::Contract
            }
            PlayerError::NotAttached { .. } | PlayerError::InvalidState { .. } => {
                ErrorCategory::State
            }
            PlayerError::Configuration { .. } => ErrorCategory::Configuration,
            PlayerError::ThreadSpawn { .. } => ErrorCategory::System,
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlayerError::NotAttached { .. } => true,
            PlayerError::InvalidState { .. } => true,
            PlayerError::ThreadSpawn { .. } => true,
            PlayerError::AlreadyAttached { .. }
            | PlayerError::Unsupported { .. }
            | PlayerError::Configuration { .. } => false,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The caller misused the API
    Contract,
    /// The request does not fit the current player state
    State,
    /// Configuration and parameter errors
    Configuration,
    /// Operating system resources
    System,
}
