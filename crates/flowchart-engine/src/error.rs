//! Error types for the flowchart engine
//!
//! Structural problems (orphans, self-loops) are not errors; they are
//! returned as `ValidationIssue`s. Everything here is a contract or
//! upstream failure.

use thiserror::Error;

/// Result type alias using FlowchartError
pub type Result<T> = std::result::Result<T, FlowchartError>;

/// Errors that can occur while producing a flowchart
#[derive(Debug, Error)]
pub enum FlowchartError {
    /// Raw input does not have the expected shape (e.g. edges not a list)
    #[error("Flowchart has invalid structure: {0}")]
    Schema(String),

    /// Upstream content could not be parsed as JSON
    #[error("Model returned malformed JSON for flowchart: {0}")]
    MalformedJson(String),

    /// Upstream returned no content at all
    #[error("Model returned empty content for flowchart generation")]
    EmptyResponse,

    /// The flowchart model call itself failed
    #[error("Flowchart model error: {0}")]
    Model(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FlowchartError {
    /// Create a schema error with a message
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    /// Create a model error with a message
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }
}
