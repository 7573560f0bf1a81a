//! Tabular resources referenced from documents.
//!
//! # Invariants
//! - `table_name` is derived once from document id and resource name, and is
//!   unique across the store.
//! - `table_created` and `loaded` only ever move from `false` to `true`.

use super::document::DocumentId;
use super::term::TermId;
use super::tracked::Tracked;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub type ResourceId = i64;

static STRIP_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s\-.]").expect("valid regex"));
static COLLAPSE_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-\s]+").expect("valid regex"));

/// One column descriptor from a datafile schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub header: String,
    #[serde(default = "default_datatype")]
    pub datatype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ColumnSpec {
    pub fn new(header: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            datatype: datatype.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

fn default_datatype() -> String {
    "string".to_string()
}

/// Stored resource metadata plus materialization flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub document_id: DocumentId,
    pub resource_term_id: TermId,
    pub name: String,
    pub source_url: Option<String>,
    pub table_name: String,
    pub schema: Tracked<Vec<ColumnSpec>>,
    pub table_created: bool,
    pub loaded: bool,
}

impl Resource {
    /// Physical table name: `d<document_id>_<slug>`.
    pub fn make_table_name(document_id: DocumentId, name: &str) -> String {
        format!("d{document_id}_{}", tablenamify(name))
    }
}

/// Insert payload for a resource row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewResource {
    pub document_id: DocumentId,
    pub resource_term_id: TermId,
    pub name: String,
    pub source_url: Option<String>,
    pub table_name: String,
    pub schema: Vec<ColumnSpec>,
}

/// Slugifies a resource name into a table-name fragment.
pub fn tablenamify(value: &str) -> String {
    let ascii: String = value.chars().filter(char::is_ascii).collect();
    let lowered = ascii.trim().to_lowercase();
    let stripped = STRIP_CHARS.replace_all(&lowered, "");
    COLLAPSE_SEPARATORS.replace_all(&stripped, "_").into_owned()
}
