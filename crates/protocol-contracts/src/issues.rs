//! Validation issues
//!
//! Issues are data, never errors: validators return them and callers decide
//! whether an error-severity issue blocks acceptance.

use serde::{Deserialize, Serialize};

/// Severity of a validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// Area a validation issue belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum IssueCategory {
    /// Structural consistency of a decision flowchart
    FlowchartConsistency,
}

/// A single finding produced by a validation rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// Identifier of the rule that produced this issue
    pub rule_id: String,
    /// Human-readable description
    pub message: String,
    pub severity: Severity,
    pub category: IssueCategory,
    /// Rule-specific context (e.g. `{"nodeId": "..."}`)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl ValidationIssue {
    /// Create an error-severity issue
    pub fn error(
        rule_id: impl Into<String>,
        category: IssueCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            message: message.into(),
            severity: Severity::Error,
            category,
            details: serde_json::Value::Null,
        }
    }

    /// Create a warning-severity issue
    pub fn warning(
        rule_id: impl Into<String>,
        category: IssueCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(rule_id, category, message)
        }
    }

    /// Attach rule-specific details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}
