//! Generation session state
//!
//! A session correlates one generation attempt across reconnects and
//! continuations. A retry from scratch always creates a new session.

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use protocol_contracts::{GenerationMode, SectionNumber, TOTAL_SECTIONS};
use serde::{Deserialize, Serialize};

use crate::progress::{estimate_time_remaining, FailureInfo};

/// Lifecycle status of a generation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// No session has been started
    #[default]
    Idle,
    /// Research phase before the first section group
    Researching,
    /// Sections are being produced
    Generating,
    /// The session failed; retry or continue are possible
    Error,
    /// All sections completed
    Success,
}

impl GenerationStatus {
    /// Researching or generating
    pub fn is_active(self) -> bool {
        matches!(self, Self::Researching | Self::Generating)
    }

    /// Error or success; no further events are applied
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Success)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Researching => "researching",
            Self::Generating => "generating",
            Self::Error => "error",
            Self::Success => "success",
        }
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse step shown alongside the status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStep {
    #[default]
    Research,
    Generation,
    Validation,
    Complete,
}

/// Opaque session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session id
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of one generation session
#[derive(Debug, Clone)]
pub struct GenerationSession {
    pub id: SessionId,
    pub mode: GenerationMode,
    pub status: GenerationStatus,
    /// Sections confirmed complete; only ever grows within a session
    pub completed: BTreeSet<SectionNumber>,
    pub current_group: Option<String>,
    pub last_error: Option<FailureInfo>,
    /// Wall-clock start of the session
    pub started_at: DateTime<Utc>,
    /// Monotonic start of the session, kept across continuations
    started: Instant,
    eta: Option<Duration>,
}

impl GenerationSession {
    pub fn new(mode: GenerationMode, now: Instant) -> Self {
        Self {
            id: SessionId::generate(),
            mode,
            status: GenerationStatus::Researching,
            completed: BTreeSet::new(),
            current_group: None,
            last_error: None,
            started_at: Utc::now(),
            started: now,
            eta: None,
        }
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.completed.len() >= TOTAL_SECTIONS
    }

    /// Highest completed section, the resume point for a continuation
    pub fn last_completed(&self) -> Option<SectionNumber> {
        self.completed.iter().next_back().copied()
    }

    /// Merge a cumulative section report
    ///
    /// Reports whose count does not exceed the recorded count are stale
    /// (duplicates or out-of-order frames) and leave the session untouched.
    /// Larger reports are unioned with the recorded set so a section is
    /// never lost. Returns true if the session advanced.
    pub fn merge_sections(&mut self, reported: &BTreeSet<SectionNumber>, now: Instant) -> bool {
        if reported.len() <= self.completed.len() {
            return false;
        }
        self.completed.extend(reported.iter().copied());
        self.refresh_eta(now);
        true
    }

    pub fn estimated_time_remaining(&self) -> Option<Duration> {
        self.eta
    }

    /// Recompute the ETA from the session start and the total completed count
    pub fn refresh_eta(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.started);
        self.eta = estimate_time_remaining(elapsed, self.completed.len(), TOTAL_SECTIONS);
    }

    pub(crate) fn finish_eta(&mut self) {
        self.eta = Some(Duration::ZERO);
    }
}
