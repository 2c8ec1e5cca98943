//! Generation session state machine
//!
//! ```text
//! idle ──start──▶ researching ──first group──▶ generating ──13/13──▶ success
//!                      │                           │
//!                      └────────── failure ────────┴──▶ error
//!                                                        │
//!                      retry (new session) / continue (same session)
//! ```
//!
//! Synchronous and clock-injected: every transition takes `now` so the
//! async driver and tests control time. Progress is idempotent under
//! duplicate and out-of-order delivery because a report is applied only
//! when it raises the completed count.

use std::collections::BTreeSet;
use std::time::Instant;

use protocol_contracts::{GenerationMode, SectionNumber, TOTAL_SECTIONS};
use serde::Serialize;

use crate::classify::{classify_error, user_message, ErrorKind};
use crate::constants::messages;
use crate::error::{GenerationError, Result};
use crate::events::ProgressEvent;
use crate::progress::{as_rounded_secs, percentage, FailureInfo, GenerationProgress};
use crate::session::{GenerationSession, GenerationStatus, GenerationStep, SessionId};

/// Where a continued session picks up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumePoint {
    pub session_id: SessionId,
    /// Highest completed section; generation resumes after it
    pub after_section: SectionNumber,
}

/// What applying an event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Completed sections grew
    Advanced,
    /// Research finished and the first group started, no new sections
    PhaseChanged,
    /// All sections completed
    Completed,
    /// The session failed
    Failed,
    /// Duplicate, stale, or arrived outside an active session
    Ignored,
}

/// State machine driving one generation session at a time
#[derive(Debug)]
pub struct GenerationOrchestrator {
    session: Option<GenerationSession>,
    step: GenerationStep,
    message: String,
    /// A listener is attached to the active session
    listening: bool,
    connected: bool,
    /// Transport trouble shown while the session is still active
    transport_error: Option<FailureInfo>,
}

impl Default for GenerationOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationOrchestrator {
    pub fn new() -> Self {
        Self {
            session: None,
            step: GenerationStep::Research,
            message: messages::READY.to_string(),
            listening: false,
            connected: false,
            transport_error: None,
        }
    }

    pub fn status(&self) -> GenerationStatus {
        self.session
            .as_ref()
            .map(|s| s.status)
            .unwrap_or(GenerationStatus::Idle)
    }

    pub fn session(&self) -> Option<&GenerationSession> {
        self.session.as_ref()
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref().map(|s| &s.id)
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Start a fresh session, discarding any previous one
    pub fn start_generation(&mut self, mode: GenerationMode, now: Instant) -> SessionId {
        let session = GenerationSession::new(mode, now);
        let id = session.id.clone();

        if let Some(previous) = &self.session {
            log::debug!("Replacing session {} ({})", previous.id, previous.status);
        }
        log::info!("Starting generation session {} ({:?})", id, mode);

        self.session = Some(session);
        self.step = GenerationStep::Research;
        self.message = initial_message(mode).to_string();
        self.listening = true;
        self.connected = false;
        self.transport_error = None;
        id
    }

    /// Retry from scratch with a new session
    ///
    /// Rejected while a listener is attached to an active session.
    pub fn retry_generation(&mut self, mode: GenerationMode, now: Instant) -> Result<SessionId> {
        self.ensure_not_running("retry")?;
        Ok(self.start_generation(mode, now))
    }

    /// Resume the current session after its last completed section
    pub fn continue_generation(&mut self, now: Instant) -> Result<ResumePoint> {
        self.ensure_not_running("continue")?;
        let status = self.status();
        if status == GenerationStatus::Success {
            return Err(GenerationError::invalid_transition(status, "continue"));
        }

        let session = self.session.as_mut().ok_or(GenerationError::NoSessionToContinue)?;
        let after_section = session.last_completed().ok_or(GenerationError::NothingToContinue)?;

        session.status = GenerationStatus::Generating;
        session.last_error = None;
        session.refresh_eta(now);

        self.step = GenerationStep::Generation;
        self.message = match after_section.next() {
            Some(next) => format!("Continuing from section {}...", next),
            None => "Finalizing protocol...".to_string(),
        };
        self.listening = true;
        self.connected = false;
        self.transport_error = None;

        log::info!(
            "Continuing session {} after section {} ({} sections kept)",
            session.id,
            after_section,
            session.completed_count()
        );

        Ok(ResumePoint {
            session_id: session.id.clone(),
            after_section,
        })
    }

    /// Move from research into generation of the first group
    pub fn begin_generating(&mut self, group: Option<&str>) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.status != GenerationStatus::Researching {
            return false;
        }
        session.status = GenerationStatus::Generating;
        if let Some(group) = group {
            session.current_group = Some(group.to_string());
        }
        self.step = GenerationStep::Generation;
        true
    }

    /// Apply a validated progress event
    pub fn apply_event(&mut self, event: ProgressEvent, now: Instant) -> EventOutcome {
        if !self.listening || !self.status().is_active() {
            log::debug!("Ignoring event while {} (listening: {})", self.status(), self.listening);
            return EventOutcome::Ignored;
        }
        self.transport_error = None;

        match event {
            ProgressEvent::Progress {
                sections,
                current_group,
                message,
            } => self.apply_progress(&sections, current_group, message, now),
            ProgressEvent::Complete { message, .. } => {
                self.complete(message, now);
                EventOutcome::Completed
            }
            ProgressEvent::Error { message, sections } => {
                self.fail(&message, &sections, now);
                EventOutcome::Failed
            }
        }
    }

    fn apply_progress(
        &mut self,
        sections: &BTreeSet<SectionNumber>,
        current_group: Option<String>,
        message: Option<String>,
        now: Instant,
    ) -> EventOutcome {
        let Some(session) = self.session.as_mut() else {
            return EventOutcome::Ignored;
        };

        if !session.merge_sections(sections, now) {
            if session.status == GenerationStatus::Researching && current_group.is_some() {
                self.begin_generating(current_group.as_deref());
                if let Some(message) = message {
                    self.message = message;
                }
                return EventOutcome::PhaseChanged;
            }
            log::debug!(
                "Ignoring progress with {} sections, already at {}",
                sections.len(),
                session.completed_count()
            );
            return EventOutcome::Ignored;
        }

        session.status = GenerationStatus::Generating;
        if current_group.is_some() {
            session.current_group = current_group;
        }
        self.step = GenerationStep::Generation;

        if session.is_complete() {
            self.finish(message);
            return EventOutcome::Completed;
        }

        self.message = message.unwrap_or_else(|| {
            format!("{}/{} sections completed", session.completed_count(), TOTAL_SECTIONS)
        });
        EventOutcome::Advanced
    }

    /// A complete event marks every section done, whatever it reports
    fn complete(&mut self, message: Option<String>, now: Instant) {
        if let Some(session) = self.session.as_mut() {
            session.merge_sections(&SectionNumber::all().collect(), now);
        }
        self.finish(message);
    }

    fn finish(&mut self, message: Option<String>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.status = GenerationStatus::Success;
        session.last_error = None;
        session.finish_eta();
        self.step = GenerationStep::Complete;
        self.message = message.unwrap_or_else(|| messages::GENERATION_COMPLETE.to_string());
        self.listening = false;
        self.transport_error = None;
        log::info!("Generation session {} completed", session.id);
    }

    /// Record a generation failure
    ///
    /// `reported_sections` carries partial progress reported alongside the
    /// failure; it is merged before `can_continue` is computed.
    pub fn fail(&mut self, raw_message: &str, reported_sections: &BTreeSet<SectionNumber>, now: Instant) {
        let kind = classify_error(raw_message);
        self.fail_with(kind, raw_message, reported_sections, now);
    }

    fn fail_with(
        &mut self,
        kind: ErrorKind,
        raw_message: &str,
        reported_sections: &BTreeSet<SectionNumber>,
        now: Instant,
    ) {
        let Some(session) = self.session.as_mut() else {
            log::warn!("Failure reported without a session: {}", raw_message);
            return;
        };
        session.merge_sections(reported_sections, now);

        let failure = FailureInfo {
            message: user_message(kind, raw_message),
            kind,
            session_id: Some(session.id.clone()),
            can_retry: true,
            can_continue: session.completed_count() > 0,
        };
        log::error!(
            "Generation session {} failed after {} sections ({:?}): {}",
            session.id,
            session.completed_count(),
            kind,
            raw_message
        );

        session.status = GenerationStatus::Error;
        session.last_error = Some(failure);
        self.message = messages::GENERATION_FAILED.to_string();
        self.listening = false;
        self.connected = false;
        self.transport_error = None;
    }

    /// The progress stream attached
    pub fn transport_connected(&mut self) {
        if self.listening {
            self.connected = true;
            self.transport_error = None;
        }
    }

    /// The progress stream dropped; the session stays active
    pub fn transport_lost(&mut self, reason: &str) {
        self.connected = false;
        if !self.listening || !self.status().is_active() {
            return;
        }
        log::warn!("Progress stream lost: {}", reason);
        self.transport_error = Some(FailureInfo {
            message: messages::CONNECTION_LOST.to_string(),
            kind: ErrorKind::Transport,
            session_id: self.session_id().cloned(),
            can_retry: true,
            can_continue: self.can_continue(),
        });
    }

    /// Reconnect attempts ran out; the session fails as a transport error
    pub fn transport_exhausted(&mut self, reason: &str, now: Instant) {
        if !self.listening || !self.status().is_active() {
            return;
        }
        self.fail_with(ErrorKind::Transport, reason, &BTreeSet::new(), now);
        if let Some(failure) = self.session.as_mut().and_then(|s| s.last_error.as_mut()) {
            failure.message = messages::CONNECTION_LOST.to_string();
        }
    }

    /// Stop applying events without touching completed sections
    pub fn detach(&mut self) {
        if self.listening {
            log::info!("Detaching listener from session {:?}", self.session_id().map(SessionId::as_str));
        }
        self.listening = false;
        self.connected = false;
    }

    /// True iff a session exists and at least one section completed
    pub fn can_continue(&self) -> bool {
        self.session
            .as_ref()
            .map(|s| s.completed_count() > 0)
            .unwrap_or(false)
    }

    /// Snapshot the read-model
    pub fn progress(&self) -> GenerationProgress {
        let session = self.session.as_ref();
        let completed: Vec<u8> = session
            .map(|s| s.completed.iter().map(|n| n.get()).collect())
            .unwrap_or_default();

        let error = session
            .and_then(|s| s.last_error.clone())
            .or_else(|| self.transport_error.clone())
            .map(|mut failure| {
                failure.can_continue = self.can_continue();
                failure
            });

        GenerationProgress {
            status: self.status(),
            current_step: self.step,
            total_sections: TOTAL_SECTIONS,
            percentage: percentage(completed.len(), TOTAL_SECTIONS),
            completed_sections: completed,
            current_group: session.and_then(|s| s.current_group.clone()),
            message: self.message.clone(),
            error,
            estimated_time_remaining: session
                .and_then(|s| s.estimated_time_remaining())
                .map(as_rounded_secs),
            session_id: session.map(|s| s.id.clone()),
            is_connected: self.connected,
        }
    }

    fn ensure_not_running(&self, action: &'static str) -> Result<()> {
        let status = self.status();
        if status.is_active() && self.listening {
            return Err(GenerationError::invalid_transition(status, action));
        }
        Ok(())
    }
}

fn initial_message(mode: GenerationMode) -> &'static str {
    match mode {
        GenerationMode::Automatic => messages::RESEARCH_STARTED,
        GenerationMode::Manual => messages::MANUAL_STARTED,
        GenerationMode::MaterialBased => messages::PROCESSING_MATERIAL,
    }
}
