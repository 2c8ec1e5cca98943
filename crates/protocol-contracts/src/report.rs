//! Aggregated validation report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::issues::{Severity, ValidationIssue};

/// Issue counts by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total_issues: usize,
    pub errors: usize,
    pub warnings: usize,
}

/// Issues from one validation run plus the derived verdict
///
/// `is_valid` is true when no error-severity issue exists; warnings are
/// acceptable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub summary: ValidationSummary,
    pub checked_at: DateTime<Utc>,
}

impl ValidationReport {
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let errors = issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count();
        let warnings = issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count();

        Self {
            is_valid: errors == 0,
            summary: ValidationSummary {
                total_issues: issues.len(),
                errors,
                warnings,
            },
            issues,
            checked_at: Utc::now(),
        }
    }

    /// True when the result can be accepted without human review
    pub fn accepts_silently(&self) -> bool {
        self.is_valid
    }

    /// Issues that need human review before acceptance
    pub fn blocking_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.is_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issues::IssueCategory;

    #[test]
    fn test_warnings_only_is_valid() {
        let report = ValidationReport::from_issues(vec![ValidationIssue::warning(
            "W",
            IssueCategory::FlowchartConsistency,
            "warn",
        )]);
        assert!(report.is_valid);
        assert!(report.accepts_silently());
        assert_eq!(report.summary.warnings, 1);
        assert_eq!(report.blocking_issues().count(), 0);
    }

    #[test]
    fn test_any_error_invalidates() {
        let report = ValidationReport::from_issues(vec![
            ValidationIssue::warning("W", IssueCategory::FlowchartConsistency, "warn"),
            ValidationIssue::error("E", IssueCategory::FlowchartConsistency, "err"),
        ]);
        assert!(!report.is_valid);
        assert_eq!(
            report.summary,
            ValidationSummary {
                total_issues: 2,
                errors: 1,
                warnings: 1
            }
        );
        assert_eq!(report.blocking_issues().count(), 1);
    }

    #[test]
    fn test_empty_report() {
        let report = ValidationReport::from_issues(Vec::new());
        assert!(report.is_valid);
        assert_eq!(report.summary, ValidationSummary::default());
    }
}
