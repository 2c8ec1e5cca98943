//! Protocol Contracts - shared schemas for protocol generation and flowcharts
//!
//! Leaf crate consumed by both the generation orchestrator and the
//! flowchart engine. It owns the vocabulary the two pipelines share
//! without coupling them to each other:
//!
//! - `SectionNumber` and the five ordered `SectionGroup`s of a protocol
//! - `ProtocolContent`: the assembled section content handed to flowchart generation
//! - `GenerationMode`: how a generation was requested
//! - `ValidationIssue` / `ValidationReport`: structural findings returned as data

pub mod content;
pub mod issues;
pub mod report;
pub mod sections;

pub use content::{GenerationMode, ProtocolContent, SectionContent};
pub use issues::{IssueCategory, Severity, ValidationIssue};
pub use report::{ValidationReport, ValidationSummary};
pub use sections::{
    group_of, remaining_groups, SectionError, SectionGroup, SectionNumber, SECTION_GROUPS,
    TOTAL_SECTIONS,
};
