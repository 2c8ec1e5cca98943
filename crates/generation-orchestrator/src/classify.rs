//! Error classification
//!
//! The only place raw failure text is matched against known provider
//! messages. Everything else works with `ErrorKind`.

use serde::{Deserialize, Serialize};

use crate::constants::{classification, messages};

/// Category of a generation failure shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The provider requires organization verification for the model
    ModelUnverified,
    /// Any other failure reported by the generation service
    Generic,
    /// The progress stream could not be kept open
    Transport,
}

/// Classify a raw generation failure message
pub fn classify_error(message: &str) -> ErrorKind {
    if message.contains(classification::MODEL_VERIFICATION_MARKER) {
        ErrorKind::ModelUnverified
    } else {
        ErrorKind::Generic
    }
}

/// Message to show for a failure of the given kind
pub fn user_message(kind: ErrorKind, raw: &str) -> String {
    match kind {
        ErrorKind::ModelUnverified => messages::MODEL_UNVERIFIED.to_string(),
        _ if raw.trim().is_empty() => messages::UNKNOWN_ERROR.to_string(),
        _ => raw.to_string(),
    }
}
