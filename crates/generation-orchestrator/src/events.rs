//! Progress events and their wire envelope
//!
//! Frames arrive as loosely shaped JSON. They are validated here, at the
//! stream boundary, into a typed `ProgressEvent` before the state machine
//! ever sees them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use protocol_contracts::{SectionError, SectionNumber};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Frame rejected at the stream boundary
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Malformed progress frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Progress frame reports an invalid section: {0}")]
    Section(#[from] SectionError),

    #[error("Error frame carries neither an error nor a message")]
    MissingErrorDetail,
}

/// Discriminator of a wire frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// Subscription acknowledgement, carries no progress
    Connected,
    Progress,
    Complete,
    Error,
}

/// Payload of a wire frame; every field is optional on the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_groups: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sections_completed: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>,
}

/// A progress frame as it travels over the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEnvelope {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub data: ProgressPayload,
    /// Top-level message, only used by `connected` frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ProgressEnvelope {
    pub fn new(kind: FrameKind, protocol_id: &str, session_id: Option<&str>, data: ProgressPayload) -> Self {
        Self {
            kind,
            protocol_id: Some(protocol_id.to_string()),
            session_id: session_id.map(str::to_string),
            data,
            message: None,
            timestamp: Some(Utc::now()),
        }
    }

    /// Acknowledgement sent when a subscriber attaches
    pub fn connected(protocol_id: &str) -> Self {
        Self {
            message: Some(format!("Connected to progress stream for protocol {}", protocol_id)),
            ..Self::new(FrameKind::Connected, protocol_id, None, ProgressPayload::default())
        }
    }

    /// Validate the envelope into a typed event
    ///
    /// `connected` frames yield `None`.
    pub fn into_event(self) -> Result<Option<ProgressEvent>, WireError> {
        if self.kind == FrameKind::Connected {
            return Ok(None);
        }
        let sections = parse_sections(self.data.sections_completed.as_deref())?;
        let event = match self.kind {
            FrameKind::Connected => return Ok(None),
            FrameKind::Progress => ProgressEvent::Progress {
                sections,
                current_group: self.data.current_group,
                message: self.data.message,
            },
            FrameKind::Complete => ProgressEvent::Complete {
                sections,
                message: self.data.message,
                protocol_id: self.protocol_id,
            },
            FrameKind::Error => {
                let message = self
                    .data
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .or(self.data.message)
                    .ok_or(WireError::MissingErrorDetail)?;
                ProgressEvent::Error { message, sections }
            }
        };
        Ok(Some(event))
    }
}

/// A validated progress event, consumed in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// One or more sections completed
    Progress {
        sections: BTreeSet<SectionNumber>,
        current_group: Option<String>,
        message: Option<String>,
    },
    /// The generation service finished every section
    Complete {
        sections: BTreeSet<SectionNumber>,
        message: Option<String>,
        protocol_id: Option<String>,
    },
    /// The generation service failed; `sections` may carry partial progress
    Error {
        message: String,
        sections: BTreeSet<SectionNumber>,
    },
}

impl ProgressEvent {
    /// Convenience constructor for a progress event over raw section numbers
    pub fn progress(sections: &[u8], current_group: Option<&str>) -> Result<Self, WireError> {
        Ok(Self::Progress {
            sections: parse_sections(Some(sections))?,
            current_group: current_group.map(str::to_string),
            message: None,
        })
    }

    pub fn sections(&self) -> &BTreeSet<SectionNumber> {
        match self {
            Self::Progress { sections, .. }
            | Self::Complete { sections, .. }
            | Self::Error { sections, .. } => sections,
        }
    }
}

fn parse_sections(raw: Option<&[u8]>) -> Result<BTreeSet<SectionNumber>, WireError> {
    raw.unwrap_or_default()
        .iter()
        .map(|&n| SectionNumber::new(n).map_err(WireError::from))
        .collect()
}

/// Parse one text frame from the transport
pub fn parse_frame(frame: &str) -> Result<Option<ProgressEvent>, WireError> {
    let envelope: ProgressEnvelope = serde_json::from_str(frame)?;
    envelope.into_event()
}
