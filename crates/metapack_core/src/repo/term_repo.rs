//! Term repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist flattened term rows and read them back in insertion order.
//! - Validate parent/section linkage before writing.
//!
//! # Invariants
//! - A term's parent and section belong to the same document.
//! - Sections are `section` or `root` rows; only `root` rows may omit one.
//! - Term ids grow in insertion order, so parents precede their children.

use super::{StoreError, StoreResult};
use crate::db::Session;
use crate::model::document::DocumentId;
use crate::model::term::{NewTerm, TermId, TermKind, TermRecord};
use crate::model::tracked::TrackedMap;
use rusqlite::{params, Connection, OptionalExtension, Row};

const TERM_SELECT_SQL: &str = "SELECT
    id,
    document_id,
    kind,
    parent_id,
    section_id,
    parent_term,
    record_term,
    term_value_name,
    value,
    properties
FROM mt_terms";

/// Repository interface for term rows.
pub trait TermRepository {
    /// Inserts one term and returns its id.
    fn insert_term(&self, term: &NewTerm) -> StoreResult<TermId>;
    fn get_term(&self, id: TermId) -> StoreResult<Option<TermRecord>>;
    /// Lists every term of a document ordered by id.
    fn list_terms(&self, document_id: DocumentId) -> StoreResult<Vec<TermRecord>>;
    /// Counts terms of one document, or of the whole store.
    fn count_terms(&self, document_id: Option<DocumentId>) -> StoreResult<i64>;
}

/// SQLite-backed term repository bound to one session.
pub struct SqliteTermRepository<'s> {
    conn: &'s Connection,
}

impl<'s> SqliteTermRepository<'s> {
    pub fn new(session: &'s Session<'_>) -> Self {
        Self {
            conn: session.conn(),
        }
    }

    fn ensure_linkage(&self, term: &NewTerm) -> StoreResult<()> {
        if let Some(parent_id) = term.parent_id {
            let (document_id, _) = self.link_target(parent_id, "parent")?;
            if document_id != term.document_id {
                return Err(StoreError::ReferentialIntegrity(format!(
                    "parent term {parent_id} belongs to document {document_id}"
                )));
            }
        }

        match term.section_id {
            Some(section_id) => {
                let (document_id, kind) = self.link_target(section_id, "section")?;
                if document_id != term.document_id {
                    return Err(StoreError::ReferentialIntegrity(format!(
                        "section term {section_id} belongs to document {document_id}"
                    )));
                }
                if !kind.is_section() {
                    return Err(StoreError::ReferentialIntegrity(format!(
                        "term {section_id} is a `{}` term, not a section",
                        kind.as_str()
                    )));
                }
            }
            None if term.kind != TermKind::Root => {
                return Err(StoreError::ReferentialIntegrity(format!(
                    "term `{}.{}` has no section",
                    term.parent_term, term.record_term
                )));
            }
            None => {}
        }
        Ok(())
    }

    fn link_target(&self, id: TermId, role: &str) -> StoreResult<(DocumentId, TermKind)> {
        let row: Option<(DocumentId, String)> = self
            .conn
            .query_row(
                "SELECT document_id, kind FROM mt_terms WHERE id = ?1;",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (document_id, kind) = row.ok_or_else(|| {
            StoreError::ReferentialIntegrity(format!("{role} term {id} does not exist"))
        })?;
        Ok((document_id, parse_kind(&kind)?))
    }
}

impl TermRepository for SqliteTermRepository<'_> {
    fn insert_term(&self, term: &NewTerm) -> StoreResult<TermId> {
        self.ensure_linkage(term)?;
        self.conn.execute(
            "INSERT INTO mt_terms (
                document_id,
                kind,
                parent_id,
                section_id,
                parent_term,
                record_term,
                term_value_name,
                value,
                properties
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                term.document_id,
                term.kind.as_str(),
                term.parent_id,
                term.section_id,
                term.parent_term.as_str(),
                term.record_term.as_str(),
                term.term_value_name.as_deref(),
                term.value.as_deref(),
                serde_json::to_string(&term.properties)?,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_term(&self, id: TermId) -> StoreResult<Option<TermRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("{TERM_SELECT_SQL} WHERE id = ?1;"),
                [id],
                parse_term_row,
            )
            .optional()?;
        row.map(RawTerm::into_record).transpose()
    }

    fn list_terms(&self, document_id: DocumentId) -> StoreResult<Vec<TermRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TERM_SELECT_SQL}
             WHERE document_id = ?1
             ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([document_id])?;
        let mut terms = Vec::new();
        while let Some(row) = rows.next()? {
            terms.push(parse_term_row(row)?.into_record()?);
        }
        Ok(terms)
    }

    fn count_terms(&self, document_id: Option<DocumentId>) -> StoreResult<i64> {
        let count = match document_id {
            Some(document_id) => self.conn.query_row(
                "SELECT COUNT(*) FROM mt_terms WHERE document_id = ?1;",
                [document_id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM mt_terms;", [], |row| row.get(0))?,
        };
        Ok(count)
    }
}

struct RawTerm {
    id: TermId,
    document_id: DocumentId,
    kind: String,
    parent_id: Option<TermId>,
    section_id: Option<TermId>,
    parent_term: String,
    record_term: String,
    term_value_name: Option<String>,
    value: Option<String>,
    properties: Option<String>,
}

impl RawTerm {
    fn into_record(self) -> StoreResult<TermRecord> {
        let properties = TrackedMap::from_json(self.properties.as_deref()).map_err(|err| {
            StoreError::InvalidData(format!(
                "invalid json map in mt_terms.properties for term {}: {err}",
                self.id
            ))
        })?;
        Ok(TermRecord {
            id: self.id,
            document_id: self.document_id,
            kind: parse_kind(&self.kind)?,
            parent_id: self.parent_id,
            section_id: self.section_id,
            parent_term: self.parent_term,
            record_term: self.record_term,
            term_value_name: self.term_value_name,
            value: self.value,
            properties,
        })
    }
}

fn parse_term_row(row: &Row<'_>) -> rusqlite::Result<RawTerm> {
    Ok(RawTerm {
        id: row.get("id")?,
        document_id: row.get("document_id")?,
        kind: row.get("kind")?,
        parent_id: row.get("parent_id")?,
        section_id: row.get("section_id")?,
        parent_term: row.get("parent_term")?,
        record_term: row.get("record_term")?,
        term_value_name: row.get("term_value_name")?,
        value: row.get("value")?,
        properties: row.get("properties")?,
    })
}

fn parse_kind(value: &str) -> StoreResult<TermKind> {
    TermKind::parse(value)
        .ok_or_else(|| StoreError::InvalidData(format!("invalid term kind `{value}`")))
}
