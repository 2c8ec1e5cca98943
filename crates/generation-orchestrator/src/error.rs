//! Error types for the generation orchestrator
//!
//! Only caller contract violations are returned as errors. Generation and
//! transport failures are recorded in the progress read-model instead.

use thiserror::Error;

use crate::session::GenerationStatus;

/// Result type alias using GenerationError
pub type Result<T> = std::result::Result<T, GenerationError>;

/// Errors that can occur when driving a generation session
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The requested action is not allowed from the current status
    #[error("Cannot {action} while generation is {from}")]
    InvalidTransition {
        from: GenerationStatus,
        action: &'static str,
    },

    /// Continue was requested but no session id exists
    #[error("No session ID available to continue")]
    NoSessionToContinue,

    /// Continue was requested but no section has completed yet
    #[error("No completed sections to continue from")]
    NothingToContinue,

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GenerationError {
    pub fn invalid_transition(from: GenerationStatus, action: &'static str) -> Self {
        Self::InvalidTransition { from, action }
    }
}
