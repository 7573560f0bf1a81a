//! Persisted term rows and the kind discriminator.
//!
//! # Invariants
//! - `kind` is the only column that selects term behavior.
//! - Names are stored lowercased; the dotted name is `parent_term.record_term`.
//! - Non-root terms always carry a `section_id`.

use super::document::DocumentId;
use super::tracked::{PropertyMap, TrackedMap};

/// Surrogate key of one term row; ids grow in insertion order.
pub type TermId = i64;

/// Stored discriminator for polymorphic term behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TermKind {
    Plain,
    Section,
    /// Top-level section; exactly one per document.
    Root,
    Resource,
    Distribution,
}

impl TermKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Section => "section",
            Self::Root => "root",
            Self::Resource => "resource",
            Self::Distribution => "distribution",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "plain" => Some(Self::Plain),
            "section" => Some(Self::Section),
            "root" => Some(Self::Root),
            "resource" => Some(Self::Resource),
            "distribution" => Some(Self::Distribution),
            _ => None,
        }
    }

    /// Whether terms of this kind may own section members.
    pub fn is_section(self) -> bool {
        matches!(self, Self::Section | Self::Root)
    }

    pub fn is_resource(self) -> bool {
        matches!(self, Self::Resource | Self::Distribution)
    }
}

/// Term row as read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct TermRecord {
    pub id: TermId,
    pub document_id: DocumentId,
    pub kind: TermKind,
    pub parent_id: Option<TermId>,
    pub section_id: Option<TermId>,
    pub parent_term: String,
    pub record_term: String,
    pub term_value_name: Option<String>,
    pub value: Option<String>,
    pub properties: TrackedMap,
}

impl TermRecord {
    pub fn qualified_name(&self) -> String {
        qualified_name(&self.parent_term, &self.record_term)
    }
}

/// Insert payload for one term row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTerm {
    pub document_id: DocumentId,
    pub kind: TermKind,
    pub parent_id: Option<TermId>,
    pub section_id: Option<TermId>,
    pub parent_term: String,
    pub record_term: String,
    pub term_value_name: Option<String>,
    pub value: Option<String>,
    pub properties: PropertyMap,
}

pub(crate) fn qualified_name(parent_term: &str, record_term: &str) -> String {
    format!("{parent_term}.{record_term}")
}
