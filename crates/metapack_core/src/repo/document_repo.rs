//! Document repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Insert, find, list and delete `mt_documents` rows.
//! - Normalize `ref` lookups before matching.
//!
//! # Invariants
//! - Duplicate `identifier`/`name` fail with `UniqueConstraintViolation`.
//! - Deleting a document removes its resources and terms in the same scope.

use super::{StoreError, StoreResult};
use crate::db::Session;
use crate::model::document::{
    normalize_ref, Document, DocumentId, DocumentKey, DocumentSummary, NewDocument,
};
use crate::model::tracked::TrackedMap;
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};

const DOCUMENT_SELECT_SQL: &str = "SELECT
    id,
    identifier,
    name,
    title,
    description,
    dataset,
    origin,
    space,
    time,
    grain,
    variant,
    ref,
    package_url,
    decl_sections,
    decl_terms,
    derived_terms,
    super_terms
FROM mt_documents";

/// Repository interface for document rows.
pub trait DocumentRepository {
    /// Inserts a document and returns the stored row.
    fn insert_document(&self, document: &NewDocument) -> StoreResult<Document>;
    /// Finds at most one document by key.
    fn find_document(&self, key: &DocumentKey) -> StoreResult<Option<Document>>;
    /// Lists summaries in insertion order.
    fn list_documents(&self) -> StoreResult<Vec<DocumentSummary>>;
    /// Deletes a document with its terms and resources.
    fn delete_document(&self, id: DocumentId) -> StoreResult<()>;
    fn count_documents(&self) -> StoreResult<i64>;
}

/// SQLite-backed document repository bound to one session.
pub struct SqliteDocumentRepository<'s> {
    conn: &'s Connection,
}

impl<'s> SqliteDocumentRepository<'s> {
    pub fn new(session: &'s Session<'_>) -> Self {
        Self {
            conn: session.conn(),
        }
    }
}

impl DocumentRepository for SqliteDocumentRepository<'_> {
    fn insert_document(&self, document: &NewDocument) -> StoreResult<Document> {
        self.conn.execute(
            "INSERT INTO mt_documents (
                identifier,
                name,
                title,
                description,
                dataset,
                origin,
                space,
                time,
                grain,
                variant,
                ref,
                package_url,
                decl_sections,
                decl_terms,
                derived_terms,
                super_terms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16);",
            params![
                document.identifier.as_str(),
                document.name.as_str(),
                document.title.as_deref(),
                document.description.as_deref(),
                document.dataset.as_deref(),
                document.origin.as_deref(),
                document.space.as_deref(),
                document.time.as_deref(),
                document.grain.as_deref(),
                document.variant.as_deref(),
                document.reference.as_deref(),
                document.package_url.as_deref(),
                serde_json::to_string(&document.decl_sections)?,
                serde_json::to_string(&document.decl_terms)?,
                serde_json::to_string(&document.derived_terms)?,
                serde_json::to_string(&document.super_terms)?,
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        info!(
            "event=document_insert module=repo status=ok document_id={id} name={}",
            document.name
        );
        self.find_document(&DocumentKey::Id(id))?
            .ok_or_else(|| StoreError::NotFound(format!("document {}", DocumentKey::Id(id))))
    }

    fn find_document(&self, key: &DocumentKey) -> StoreResult<Option<Document>> {
        let found = match key {
            DocumentKey::Id(id) => self
                .conn
                .query_row(
                    &format!("{DOCUMENT_SELECT_SQL} WHERE id = ?1;"),
                    [id],
                    parse_document_row,
                )
                .optional()?,
            DocumentKey::Identifier(identifier) => self
                .conn
                .query_row(
                    &format!("{DOCUMENT_SELECT_SQL} WHERE identifier = ?1;"),
                    [identifier],
                    parse_document_row,
                )
                .optional()?,
            DocumentKey::Name(name) => self
                .conn
                .query_row(
                    &format!("{DOCUMENT_SELECT_SQL} WHERE name = ?1;"),
                    [name],
                    parse_document_row,
                )
                .optional()?,
            DocumentKey::Ref(reference) => self
                .conn
                .query_row(
                    &format!(
                        "{DOCUMENT_SELECT_SQL}
                         WHERE ref = ?1 OR package_url = ?1
                         ORDER BY id ASC
                         LIMIT 1;"
                    ),
                    [normalize_ref(reference)],
                    parse_document_row,
                )
                .optional()?,
        };

        found.map(DocumentRow::into_document).transpose()
    }

    fn list_documents(&self) -> StoreResult<Vec<DocumentSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, identifier, name, title, description
             FROM mt_documents
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            documents.push(DocumentSummary {
                id: row.get("id")?,
                identifier: row.get("identifier")?,
                name: row.get("name")?,
                title: row.get("title")?,
                description: row.get("description")?,
            });
        }
        Ok(documents)
    }

    fn delete_document(&self, id: DocumentId) -> StoreResult<()> {
        // Children first: the term self-references are not cascading.
        let resources = self
            .conn
            .execute("DELETE FROM mt_resources WHERE document_id = ?1;", [id])?;
        let terms = self
            .conn
            .execute("DELETE FROM mt_terms WHERE document_id = ?1;", [id])?;
        let changed = self
            .conn
            .execute("DELETE FROM mt_documents WHERE id = ?1;", [id])?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!(
                "document {}",
                DocumentKey::Id(id)
            )));
        }
        info!(
            "event=document_delete module=repo status=ok document_id={id} terms={terms} resources={resources}"
        );
        Ok(())
    }

    fn count_documents(&self) -> StoreResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM mt_documents;", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Raw row with JSON columns still encoded.
struct DocumentRow {
    id: DocumentId,
    identifier: String,
    name: String,
    title: Option<String>,
    description: Option<String>,
    dataset: Option<String>,
    origin: Option<String>,
    space: Option<String>,
    time: Option<String>,
    grain: Option<String>,
    variant: Option<String>,
    reference: Option<String>,
    package_url: Option<String>,
    decl_sections: Option<String>,
    decl_terms: Option<String>,
    derived_terms: Option<String>,
    super_terms: Option<String>,
}

impl DocumentRow {
    fn into_document(self) -> StoreResult<Document> {
        Ok(Document {
            id: self.id,
            identifier: self.identifier,
            name: self.name,
            title: self.title,
            description: self.description,
            dataset: self.dataset,
            origin: self.origin,
            space: self.space,
            time: self.time,
            grain: self.grain,
            variant: self.variant,
            reference: self.reference,
            package_url: self.package_url,
            decl_sections: parse_map(self.decl_sections, "mt_documents.decl_sections")?,
            decl_terms: parse_map(self.decl_terms, "mt_documents.decl_terms")?,
            derived_terms: parse_map(self.derived_terms, "mt_documents.derived_terms")?,
            super_terms: parse_map(self.super_terms, "mt_documents.super_terms")?,
        })
    }
}

fn parse_document_row(row: &Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get("id")?,
        identifier: row.get("identifier")?,
        name: row.get("name")?,
        title: row.get("title")?,
        description: row.get("description")?,
        dataset: row.get("dataset")?,
        origin: row.get("origin")?,
        space: row.get("space")?,
        time: row.get("time")?,
        grain: row.get("grain")?,
        variant: row.get("variant")?,
        reference: row.get("ref")?,
        package_url: row.get("package_url")?,
        decl_sections: row.get("decl_sections")?,
        decl_terms: row.get("decl_terms")?,
        derived_terms: row.get("derived_terms")?,
        super_terms: row.get("super_terms")?,
    })
}

fn parse_map(text: Option<String>, column: &'static str) -> StoreResult<TrackedMap> {
    TrackedMap::from_json(text.as_deref()).map_err(|err| {
        StoreError::InvalidData(format!("invalid json map in {column}: {err}"))
    })
}
