//! Research/generation service seam
//!
//! The service produces section content and reports progress through the
//! progress transport. It must honor resume points keyed by session id.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use protocol_contracts::{GenerationMode, SectionNumber};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orchestrator::ResumePoint;
use crate::session::SessionId;

/// What to generate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub protocol_id: String,
    pub medical_condition: String,
    #[serde(default)]
    pub mode: GenerationMode,
    /// Free-form protocol metadata forwarded to the service
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl GenerationRequest {
    pub fn new(protocol_id: impl Into<String>, medical_condition: impl Into<String>) -> Self {
        Self {
            protocol_id: protocol_id.into(),
            medical_condition: medical_condition.into(),
            mode: GenerationMode::default(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Failure reported by the generation service
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ServiceError {
    pub message: String,
    /// Sections the service finished before failing
    pub completed_sections: Vec<u8>,
}

impl ServiceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            completed_sections: Vec::new(),
        }
    }

    pub fn with_completed(mut self, sections: Vec<u8>) -> Self {
        self.completed_sections = sections;
        self
    }

    /// Completed sections that are valid section numbers
    pub fn completed(&self) -> BTreeSet<SectionNumber> {
        self.completed_sections
            .iter()
            .filter_map(|&n| SectionNumber::new(n).ok())
            .collect()
    }
}

/// Produces protocol sections and emits progress while doing so
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Generate all sections for a new session
    async fn start(&self, request: &GenerationRequest, session_id: &SessionId) -> Result<(), ServiceError>;

    /// Generate the sections after `resume.after_section` for an existing session
    async fn resume(&self, request: &GenerationRequest, resume: &ResumePoint) -> Result<(), ServiceError>;
}

#[async_trait]
impl<T: GenerationService + ?Sized> GenerationService for Arc<T> {
    async fn start(&self, request: &GenerationRequest, session_id: &SessionId) -> Result<(), ServiceError> {
        (**self).start(request, session_id).await
    }

    async fn resume(&self, request: &GenerationRequest, resume: &ResumePoint) -> Result<(), ServiceError> {
        (**self).resume(request, resume).await
    }
}
