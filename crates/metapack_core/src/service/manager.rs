//! Metadata manager facade.
//!
//! # Responsibility
//! - Own the session manager and expose use-case level store operations.
//! - Tie import, lookup, deletion and materialization together.
//!
//! # Invariants
//! - Every operation runs inside a session scope; calls made from within an
//!   outer scope join it.
//! - Deleting a document also drops the data tables of its resources.

use crate::config::ManagerConfig;
use crate::db::catalog::{self, verify_store_schema};
use crate::db::{open_db, open_db_in_memory, OpenOptions, Session, SessionManager, SessionOptions};
use crate::model::document::{Document, DocumentKey, DocumentSummary, NewDocument};
use crate::model::resource::Resource;
use crate::model::tree::DocTree;
use crate::repo::document_repo::{DocumentRepository, SqliteDocumentRepository};
use crate::repo::resource_repo::{ResourceRepository, SqliteResourceRepository};
use crate::repo::{StoreError, StoreResult};
use crate::service::materializer::{LoadOutcome, Materialized, ResourceMaterializer, TableOutcome};
use crate::service::projector::{flatten, ImportReport, StoredDocument};
use crate::source::RowSource;
use log::info;
use rusqlite::Connection;

/// Which resources [`MetadataManager::load`] materializes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSelection {
    None,
    Named(String),
    All,
}

/// Outcome of [`MetadataManager::load`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub document: Document,
    /// `false` when a document with the same name was already stored.
    pub imported: bool,
    /// Materialized resources with their outcomes, in resource id order.
    pub resources: Vec<(Resource, Materialized)>,
}

/// Facade over one metadata store connection.
pub struct MetadataManager {
    sessions: SessionManager,
}

impl MetadataManager {
    /// Opens the store named by `config`, in memory when no database is set.
    pub fn open(config: &ManagerConfig) -> StoreResult<Self> {
        let options = config.open_options();
        let conn = match &config.database {
            Some(path) => open_db(path, &options)?,
            None => open_db_in_memory(&options)?,
        };
        Self::from_connection(conn, config.session_options())
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = open_db_in_memory(&OpenOptions::default())?;
        Self::from_connection(conn, SessionOptions::default())
    }

    /// Wraps an already bootstrapped connection.
    ///
    /// # Errors
    /// `Db` when the connection does not carry the store schema.
    pub fn from_connection(conn: Connection, options: SessionOptions) -> StoreResult<Self> {
        verify_store_schema(&conn)?;
        Ok(Self {
            sessions: SessionManager::new(conn, options),
        })
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Runs `f` in a session scope of this manager.
    pub fn with_session<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Session<'_>) -> StoreResult<T>,
    {
        self.sessions.with_session(f)
    }

    /// Imports a tree as a new document.
    pub fn import_document(&self, tree: &DocTree) -> StoreResult<ImportReport> {
        self.with_session(|session| flatten(session, tree))
    }

    /// Deletes the document with the tree's identifier (if any), then imports.
    pub fn replace_document(&self, tree: &DocTree) -> StoreResult<ImportReport> {
        let header = NewDocument::from_tree(tree)?;
        self.with_session(|session| {
            let existing = SqliteDocumentRepository::new(session)
                .find_document(&DocumentKey::Identifier(header.identifier.clone()))?;
            if let Some(existing) = existing {
                delete_in_session(session, &existing)?;
            }
            flatten(session, tree)
        })
    }

    pub fn document(&self, key: &DocumentKey) -> StoreResult<Option<Document>> {
        self.with_session(|session| SqliteDocumentRepository::new(session).find_document(key))
    }

    /// Like [`Self::document`], but absence is an error.
    pub fn require_document(&self, key: &DocumentKey) -> StoreResult<Document> {
        self.document(key)?
            .ok_or_else(|| StoreError::NotFound(format!("document {key}")))
    }

    pub fn documents(&self) -> StoreResult<Vec<DocumentSummary>> {
        self.with_session(|session| SqliteDocumentRepository::new(session).list_documents())
    }

    pub fn delete_document(&self, key: &DocumentKey) -> StoreResult<()> {
        self.with_session(|session| {
            let document = SqliteDocumentRepository::new(session)
                .find_document(key)?
                .ok_or_else(|| StoreError::NotFound(format!("document {key}")))?;
            delete_in_session(session, &document)
        })
    }

    /// Reads a document's rows; the tree is rebuilt on first access.
    pub fn load_document(&self, key: &DocumentKey) -> StoreResult<StoredDocument> {
        self.with_session(|session| {
            let document = SqliteDocumentRepository::new(session)
                .find_document(key)?
                .ok_or_else(|| StoreError::NotFound(format!("document {key}")))?;
            StoredDocument::load(session, document)
        })
    }

    pub fn resources(&self, document: &Document) -> StoreResult<Vec<Resource>> {
        self.with_session(|session| {
            SqliteResourceRepository::new(session).list_resources(document.id)
        })
    }

    /// Resource `name` of `document`; `NotFound` when absent.
    pub fn resource(&self, document: &Document, name: &str) -> StoreResult<Resource> {
        self.with_session(|session| {
            SqliteResourceRepository::new(session)
                .find_resource(document.id, name)?
                .ok_or_else(|| {
                    StoreError::NotFound(format!("resource `{name}` of document {}", document.name))
                })
        })
    }

    pub fn make_table(&self, resource: &mut Resource) -> StoreResult<TableOutcome> {
        ResourceMaterializer::new(&self.sessions).make_table(resource)
    }

    pub fn load_resource(
        &self,
        resource: &mut Resource,
        source: &dyn RowSource,
    ) -> StoreResult<LoadOutcome> {
        ResourceMaterializer::new(&self.sessions).load_resource(resource, source)
    }

    pub fn materialize(
        &self,
        resource: &mut Resource,
        source: &dyn RowSource,
    ) -> StoreResult<Materialized> {
        ResourceMaterializer::new(&self.sessions).materialize(resource, source)
    }

    /// Imports `tree` unless a document with its name exists, then
    /// materializes the selected resources.
    pub fn load(
        &self,
        tree: &DocTree,
        selection: ResourceSelection,
        source: &dyn RowSource,
    ) -> StoreResult<LoadReport> {
        let header = NewDocument::from_tree(tree)?;
        let (document, imported) = match self.document(&DocumentKey::Name(header.name.clone()))? {
            Some(document) => (document, false),
            None => (self.import_document(tree)?.document, true),
        };

        let selected = match &selection {
            ResourceSelection::None => Vec::new(),
            ResourceSelection::Named(name) => vec![self.resource(&document, name)?],
            ResourceSelection::All => self.resources(&document)?,
        };

        let mut resources = Vec::with_capacity(selected.len());
        for mut resource in selected {
            let outcome = self.materialize(&mut resource, source)?;
            resources.push((resource, outcome));
        }
        info!(
            "event=document_load module=manager status=ok document_id={} imported={imported} materialized={}",
            document.id,
            resources.len()
        );
        Ok(LoadReport {
            document,
            imported,
            resources,
        })
    }

    pub fn list_tables(&self) -> StoreResult<Vec<String>> {
        self.with_session(|session| Ok(catalog::list_tables(session.conn())?))
    }

    pub fn has_table(&self, table: &str) -> StoreResult<bool> {
        self.with_session(|session| Ok(catalog::has_table(session.conn(), table)?))
    }

    pub fn drop_table(&self, table: &str) -> StoreResult<bool> {
        self.with_session(|session| Ok(catalog::drop_table(session.conn(), table)?))
    }
}

fn delete_in_session(session: &Session<'_>, document: &Document) -> StoreResult<()> {
    let resources = SqliteResourceRepository::new(session).list_resources(document.id)?;
    let mut dropped = 0usize;
    for resource in resources.iter().filter(|resource| resource.table_created) {
        if catalog::drop_table(session.conn(), &resource.table_name)? {
            dropped += 1;
        }
    }
    SqliteDocumentRepository::new(session).delete_document(document.id)?;
    info!(
        "event=document_delete module=manager status=ok document_id={} tables_dropped={dropped}",
        document.id
    );
    Ok(())
}
