//! Resource repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist resource rows derived from datafile terms.
//! - Write back materialization flags and edited schemas.
//!
//! # Invariants
//! - Resource names are unique within a document.
//! - The schema column is only rewritten when the tracked value is dirty.

use super::{bool_to_int, int_to_bool, StoreError, StoreResult};
use crate::db::Session;
use crate::model::document::DocumentId;
use crate::model::resource::{ColumnSpec, NewResource, Resource, ResourceId};
use crate::model::tracked::Tracked;
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row};

const RESOURCE_SELECT_SQL: &str = "SELECT
    id,
    document_id,
    resource_term_id,
    name,
    source_url,
    table_name,
    schema,
    table_created,
    loaded
FROM mt_resources";

/// Repository interface for resource rows.
pub trait ResourceRepository {
    fn insert_resource(&self, resource: &NewResource) -> StoreResult<Resource>;
    fn get_resource(&self, id: ResourceId) -> StoreResult<Option<Resource>>;
    /// Lists resources of one document ordered by id.
    fn list_resources(&self, document_id: DocumentId) -> StoreResult<Vec<Resource>>;
    fn find_resource(&self, document_id: DocumentId, name: &str)
        -> StoreResult<Option<Resource>>;
    /// Writes flags back, plus the schema when it was edited.
    fn save_resource(&self, resource: &mut Resource) -> StoreResult<()>;
}

/// SQLite-backed resource repository bound to one session.
pub struct SqliteResourceRepository<'s> {
    conn: &'s Connection,
}

impl<'s> SqliteResourceRepository<'s> {
    pub fn new(session: &'s Session<'_>) -> Self {
        Self {
            conn: session.conn(),
        }
    }
}

impl ResourceRepository for SqliteResourceRepository<'_> {
    fn insert_resource(&self, resource: &NewResource) -> StoreResult<Resource> {
        self.conn.execute(
            "INSERT INTO mt_resources (
                document_id,
                resource_term_id,
                name,
                source_url,
                table_name,
                schema,
                table_created,
                loaded
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0);",
            params![
                resource.document_id,
                resource.resource_term_id,
                resource.name.as_str(),
                resource.source_url.as_deref(),
                resource.table_name.as_str(),
                serde_json::to_string(&resource.schema)?,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_resource(id)?
            .ok_or_else(|| StoreError::NotFound(format!("resource id={id}")))
    }

    fn get_resource(&self, id: ResourceId) -> StoreResult<Option<Resource>> {
        let row = self
            .conn
            .query_row(
                &format!("{RESOURCE_SELECT_SQL} WHERE id = ?1;"),
                [id],
                parse_resource_row,
            )
            .optional()?;
        row.map(RawResource::into_resource).transpose()
    }

    fn list_resources(&self, document_id: DocumentId) -> StoreResult<Vec<Resource>> {
        let mut stmt = self.conn.prepare(&format!(
            "{RESOURCE_SELECT_SQL}
             WHERE document_id = ?1
             ORDER BY id ASC;"
        ))?;
        let mut rows = stmt.query([document_id])?;
        let mut resources = Vec::new();
        while let Some(row) = rows.next()? {
            resources.push(parse_resource_row(row)?.into_resource()?);
        }
        Ok(resources)
    }

    fn find_resource(
        &self,
        document_id: DocumentId,
        name: &str,
    ) -> StoreResult<Option<Resource>> {
        let row = self
            .conn
            .query_row(
                &format!("{RESOURCE_SELECT_SQL} WHERE document_id = ?1 AND name = ?2;"),
                params![document_id, name],
                parse_resource_row,
            )
            .optional()?;
        row.map(RawResource::into_resource).transpose()
    }

    fn save_resource(&self, resource: &mut Resource) -> StoreResult<()> {
        let changed = if resource.schema.is_dirty() {
            self.conn.execute(
                "UPDATE mt_resources
                 SET table_created = ?2, loaded = ?3, schema = ?4
                 WHERE id = ?1;",
                params![
                    resource.id,
                    bool_to_int(resource.table_created),
                    bool_to_int(resource.loaded),
                    resource.schema.to_json()?,
                ],
            )?
        } else {
            self.conn.execute(
                "UPDATE mt_resources
                 SET table_created = ?2, loaded = ?3
                 WHERE id = ?1;",
                params![
                    resource.id,
                    bool_to_int(resource.table_created),
                    bool_to_int(resource.loaded),
                ],
            )?
        };

        if changed == 0 {
            return Err(StoreError::NotFound(format!("resource id={}", resource.id)));
        }
        debug!(
            "event=resource_save module=repo status=ok resource_id={} schema_written={}",
            resource.id,
            resource.schema.is_dirty()
        );
        resource.schema.mark_clean();
        Ok(())
    }
}

struct RawResource {
    id: ResourceId,
    document_id: DocumentId,
    resource_term_id: i64,
    name: String,
    source_url: Option<String>,
    table_name: String,
    schema: Option<String>,
    table_created: i64,
    loaded: i64,
}

impl RawResource {
    fn into_resource(self) -> StoreResult<Resource> {
        let schema = Tracked::<Vec<ColumnSpec>>::from_json(self.schema.as_deref()).map_err(
            |err| {
                StoreError::InvalidData(format!(
                    "invalid schema json for resource {}: {err}",
                    self.id
                ))
            },
        )?;
        Ok(Resource {
            id: self.id,
            document_id: self.document_id,
            resource_term_id: self.resource_term_id,
            name: self.name,
            source_url: self.source_url,
            table_name: self.table_name,
            schema,
            table_created: int_to_bool(self.table_created, "mt_resources.table_created")?,
            loaded: int_to_bool(self.loaded, "mt_resources.loaded")?,
        })
    }
}

fn parse_resource_row(row: &Row<'_>) -> rusqlite::Result<RawResource> {
    Ok(RawResource {
        id: row.get("id")?,
        document_id: row.get("document_id")?,
        resource_term_id: row.get("resource_term_id")?,
        name: row.get("name")?,
        source_url: row.get("source_url")?,
        table_name: row.get("table_name")?,
        schema: row.get("schema")?,
        table_created: row.get("table_created")?,
        loaded: row.get("loaded")?,
    })
}
