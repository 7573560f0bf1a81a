//! Document rows and lookup keys.
//!
//! # Invariants
//! - `identifier` and `name` are unique across the store.
//! - `reference` and `package_url` are stored with the `metapack+` scheme marker.

use super::tracked::{PropertyMap, TrackedMap};
use super::tree::DocTree;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Surrogate key of one stored document.
pub type DocumentId = i64;

/// Scheme marker prefixed onto package references.
pub const REF_SCHEME_PREFIX: &str = "metapack+";

/// Adds [`REF_SCHEME_PREFIX`] unless already present.
pub fn normalize_ref(reference: &str) -> String {
    let trimmed = reference.trim();
    if trimmed.starts_with(REF_SCHEME_PREFIX) {
        trimmed.to_string()
    } else {
        format!("{REF_SCHEME_PREFIX}{trimmed}")
    }
}

/// Validation failure while deriving a document header from a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentValidationError {
    MissingIdentifier,
    MissingName,
}

impl Display for DocumentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingIdentifier => write!(f, "document has no `root.identifier` value"),
            Self::MissingName => write!(f, "document has no `root.name` value"),
        }
    }
}

impl Error for DocumentValidationError {}

/// One stored metadata package.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub identifier: String,
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub dataset: Option<String>,
    pub origin: Option<String>,
    pub space: Option<String>,
    pub time: Option<String>,
    pub grain: Option<String>,
    pub variant: Option<String>,
    /// Stored in the `ref` column.
    pub reference: Option<String>,
    pub package_url: Option<String>,
    pub decl_sections: TrackedMap,
    pub decl_terms: TrackedMap,
    pub derived_terms: TrackedMap,
    pub super_terms: TrackedMap,
}

/// Narrow projection returned by document listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub identifier: String,
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Insert payload for a document row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub identifier: String,
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub dataset: Option<String>,
    pub origin: Option<String>,
    pub space: Option<String>,
    pub time: Option<String>,
    pub grain: Option<String>,
    pub variant: Option<String>,
    pub reference: Option<String>,
    pub package_url: Option<String>,
    pub decl_sections: PropertyMap,
    pub decl_terms: PropertyMap,
    pub derived_terms: PropertyMap,
    pub super_terms: PropertyMap,
}

impl NewDocument {
    /// Derives the header row from `root.*` terms of a parsed tree.
    pub fn from_tree(tree: &DocTree) -> Result<Self, DocumentValidationError> {
        let value = |field: &str| tree.find_value(&format!("root.{field}")).map(str::to_string);

        let identifier = value("identifier")
            .filter(|v| !v.trim().is_empty())
            .ok_or(DocumentValidationError::MissingIdentifier)?;
        let name = value("name")
            .filter(|v| !v.trim().is_empty())
            .ok_or(DocumentValidationError::MissingName)?;

        Ok(Self {
            identifier,
            name,
            title: value("title"),
            description: value("description"),
            dataset: value("dataset"),
            origin: value("origin"),
            space: value("space"),
            time: value("time"),
            grain: value("grain"),
            variant: value("variant"),
            reference: tree.reference().map(normalize_ref),
            package_url: tree.package_url().map(normalize_ref),
            decl_sections: tree.decl_sections().clone(),
            decl_terms: tree.decl_terms().clone(),
            derived_terms: tree.derived_terms().clone(),
            super_terms: tree.super_terms().clone(),
        })
    }
}

/// Ways callers address a single stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKey {
    Id(DocumentId),
    Identifier(String),
    Name(String),
    /// Matches `ref` or `package_url`, with scheme-prefix normalization.
    Ref(String),
}

impl Display for DocumentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id={id}"),
            Self::Identifier(identifier) => write!(f, "identifier={identifier}"),
            Self::Name(name) => write!(f, "name={name}"),
            Self::Ref(reference) => write!(f, "ref={reference}"),
        }
    }
}
