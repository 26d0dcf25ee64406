use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionStatus;

/// Main error type for the HyperTune system
#[derive(Error, Debug)]
pub enum TuneError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Internal failure: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Malformed input; recoverable by the caller fixing the request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid search space: {}", .violations.join("; "))]
    InvalidSearchSpace { violations: Vec<String> },

    #[error("Invalid configuration: {}", .violations.join("; "))]
    InvalidConfiguration { violations: Vec<String> },

    #[error("Invalid evaluation report: {message}")]
    InvalidReport { message: String },

    #[error("Invalid transfer request: {message}")]
    InvalidTransfer { message: String },

    #[error("Unknown analysis type: {name}")]
    UnknownAnalysisType { name: String },
}

/// Unknown identifier; terminal for the call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotFoundError {
    #[error("Search space not found: {space_id}")]
    Space { space_id: String },

    #[error("Session not found: {session_id}")]
    Session { session_id: String },

    #[error("Strategy not found: {strategy}")]
    Strategy { strategy: String },

    #[error("Configuration {configuration_id} not found in session {session_id}")]
    Configuration {
        session_id: String,
        configuration_id: String,
    },
}

/// Operation not permitted for the session's current status.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cannot {operation} session {session_id} while it is {status}")]
pub struct StateError {
    pub session_id: String,
    pub status: SessionStatus,
    pub operation: String,
}

/// Coarse classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    State,
    Internal,
}

impl TuneError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::State(_) => ErrorKind::State,
            Self::Config(_) => ErrorKind::Validation,
            Self::Internal(_) | Self::Io(_) | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Every violation carried by a validation error, empty otherwise.
    pub fn violations(&self) -> Vec<String> {
        match self {
            Self::Validation(ValidationError::InvalidSearchSpace { violations })
            | Self::Validation(ValidationError::InvalidConfiguration { violations }) => {
                violations.clone()
            }
            Self::Validation(other) => vec![other.to_string()],
            _ => Vec::new(),
        }
    }
}

/// Result type alias for HyperTune operations
pub type TuneResult<T> = Result<T, TuneError>;

/// Macro for creating internal failures
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::errors::TuneError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::errors::TuneError::Config(format!($($arg)*))
    };
}
