//! Section numbering and section groups
//!
//! A protocol document always has exactly 13 sections. Generation produces
//! them in five ordered groups, so a resumed session restarts at the first
//! group that is not fully complete.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of sections in every protocol document
pub const TOTAL_SECTIONS: usize = 13;

/// Error for section numbers outside 1..=13
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Section number {0} is outside 1..=13")]
pub struct SectionError(pub u8);

/// A validated section number (1..=13)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SectionNumber(u8);

impl SectionNumber {
    /// First section of a protocol
    pub const FIRST: SectionNumber = SectionNumber(1);
    /// Last section of a protocol
    pub const LAST: SectionNumber = SectionNumber(TOTAL_SECTIONS as u8);

    /// Create a section number, rejecting values outside 1..=13
    pub fn new(value: u8) -> Result<Self, SectionError> {
        if value == 0 || usize::from(value) > TOTAL_SECTIONS {
            return Err(SectionError(value));
        }
        Ok(Self(value))
    }

    /// The raw section number
    pub fn get(self) -> u8 {
        self.0
    }

    /// The section after this one, if any
    pub fn next(self) -> Option<Self> {
        Self::new(self.0 + 1).ok()
    }

    /// All section numbers in document order
    pub fn all() -> impl Iterator<Item = SectionNumber> {
        (1..=TOTAL_SECTIONS as u8).map(SectionNumber)
    }

    /// The first `count` sections (clamped to 13)
    pub fn first_n(count: usize) -> BTreeSet<SectionNumber> {
        Self::all().take(count).collect()
    }
}

impl TryFrom<u8> for SectionNumber {
    type Error = SectionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SectionNumber> for u8 {
    fn from(section: SectionNumber) -> Self {
        section.0
    }
}

impl fmt::Display for SectionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A group of sections generated together
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionGroup {
    /// Stable identifier for the group
    pub key: &'static str,
    /// Human-readable label, reported as `currentGroup` in progress
    pub name: &'static str,
    /// Section numbers in this group, ascending
    pub sections: &'static [u8],
    /// Short description of what the group covers
    pub description: &'static str,
}

impl SectionGroup {
    /// Check whether a section belongs to this group
    pub fn contains(&self, section: SectionNumber) -> bool {
        self.sections.contains(&section.get())
    }

    /// Check whether every section of this group is in `completed`
    pub fn is_complete(&self, completed: &BTreeSet<SectionNumber>) -> bool {
        self.sections
            .iter()
            .all(|&n| completed.iter().any(|s| s.get() == n))
    }
}

/// The five section groups, in generation order
pub static SECTION_GROUPS: [SectionGroup; 5] = [
    SectionGroup {
        key: "identification_and_context",
        name: "Identification and Context",
        sections: &[1, 2, 3],
        description: "Metadata, responsibilities and foundational concepts",
    },
    SectionGroup {
        key: "clinical_criteria",
        name: "Clinical Criteria",
        sections: &[4, 5, 6],
        description: "Inclusion/exclusion, initial assessment and diagnosis",
    },
    SectionGroup {
        key: "treatment",
        name: "Treatment",
        sections: &[7, 8],
        description: "Therapeutic approach and management of complications",
    },
    SectionGroup {
        key: "care_flow",
        name: "Care Flow",
        sections: &[9, 10],
        description: "Admission/discharge criteria and monitoring",
    },
    SectionGroup {
        key: "specifics_and_quality",
        name: "Specifics and Quality",
        sections: &[11, 12, 13],
        description: "Special considerations, indicators and references",
    },
];

/// Find the group a section belongs to
pub fn group_of(section: SectionNumber) -> &'static SectionGroup {
    SECTION_GROUPS
        .iter()
        .find(|g| g.contains(section))
        .unwrap_or(&SECTION_GROUPS[SECTION_GROUPS.len() - 1])
}

/// Groups that still have at least one incomplete section, in order
pub fn remaining_groups(completed: &BTreeSet<SectionNumber>) -> Vec<&'static SectionGroup> {
    SECTION_GROUPS
        .iter()
        .filter(|g| !g.is_complete(completed))
        .collect()
}
