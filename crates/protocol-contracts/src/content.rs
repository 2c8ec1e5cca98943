//! Protocol content and generation mode

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::sections::SectionNumber;

/// How a generation was requested
///
/// Only changes the initial status message; the state graph is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Research and generation driven entirely by the model
    #[default]
    Automatic,
    /// User-guided generation
    Manual,
    /// Generation grounded on uploaded documents
    MaterialBased,
}

/// Content of one protocol section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionContent {
    pub section_number: SectionNumber,
    pub title: String,
    /// Plain text or structured JSON, depending on the section
    pub content: serde_json::Value,
}

impl SectionContent {
    pub fn new(
        section_number: SectionNumber,
        title: impl Into<String>,
        content: serde_json::Value,
    ) -> Self {
        Self {
            section_number,
            title: title.into(),
            content,
        }
    }

    /// A section is blank when its content is null or an empty/whitespace string
    pub fn is_blank(&self) -> bool {
        match &self.content {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

/// Assembled section content, keyed by section number as a string ("1".."13")
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolContent {
    sections: BTreeMap<String, SectionContent>,
}

impl ProtocolContent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a section
    pub fn insert(&mut self, section: SectionContent) {
        self.sections
            .insert(section.section_number.to_string(), section);
    }

    /// Builder-style insert
    pub fn with_section(mut self, section: SectionContent) -> Self {
        self.insert(section);
        self
    }

    /// Look up a section by number
    pub fn section(&self, number: SectionNumber) -> Option<&SectionContent> {
        self.sections.get(&number.to_string())
    }

    /// Sections among `numbers` that are present and not blank, in order
    pub fn select(&self, numbers: &[u8]) -> Vec<&SectionContent> {
        numbers
            .iter()
            .filter_map(|n| self.sections.get(&n.to_string()))
            .filter(|s| !s.is_blank())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SectionContent> {
        self.sections.values()
    }
}
