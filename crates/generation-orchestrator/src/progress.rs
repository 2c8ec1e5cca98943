//! Progress read-model
//!
//! `GenerationProgress` is the snapshot handed to callers after every state
//! change. It is serialized with camelCase keys for UI consumers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classify::ErrorKind;
use crate::session::{GenerationStatus, GenerationStep, SessionId};

/// Structured failure recorded in the read-model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureInfo {
    /// User-facing message
    pub message: String,
    pub kind: ErrorKind,
    pub session_id: Option<SessionId>,
    /// A fresh retry is always possible
    pub can_retry: bool,
    /// True iff a session exists and at least one section completed
    pub can_continue: bool,
}

/// Snapshot of a generation session for callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationProgress {
    pub status: GenerationStatus,
    pub current_step: GenerationStep,
    pub total_sections: usize,
    /// Completed section numbers, ascending
    pub completed_sections: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_group: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureInfo>,
    /// Seconds, absent until the first section completes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>,
    pub percentage: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub is_connected: bool,
}

impl GenerationProgress {
    pub fn completed_count(&self) -> usize {
        self.completed_sections.len()
    }

    pub fn can_continue(&self) -> bool {
        self.session_id.is_some() && !self.completed_sections.is_empty()
    }
}

/// Remaining time extrapolated from the average time per completed section
///
/// `None` when nothing has completed yet.
pub fn estimate_time_remaining(elapsed: Duration, completed: usize, total: usize) -> Option<Duration> {
    if completed == 0 {
        return None;
    }
    let remaining = total.saturating_sub(completed) as u32;
    let per_section = elapsed / completed as u32;
    Some(per_section * remaining)
}

/// Whole-number completion percentage
pub fn percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (completed.min(total) as f64 / total as f64 * 100.0).round();
    pct as u8
}

/// Round a duration to whole seconds
pub(crate) fn as_rounded_secs(duration: Duration) -> u64 {
    duration.as_secs_f64().round() as u64
}
