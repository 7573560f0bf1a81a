//! Per-resource data tables.
//!
//! # Responsibility
//! - Create one physical table per resource from its stored column list.
//! - Bulk-load rows from a [`RowSource`] through the reflected column mapping.
//!
//! # Invariants
//! - `table_created` and `loaded` flip at most once; repeated calls are no-ops.
//! - Each step runs in its own session; a failure leaves its flag `false`.
//! - Loading requires the table to exist and the resource to have a source url.
//! - Column headers are distinct from each other and from [`ROW_ID_COLUMN`],
//!   compared case-insensitively like SQLite identifiers.

use crate::db::catalog::{quote_identifier, table_columns};
use crate::db::{Session, SessionManager};
use crate::model::resource::{ColumnSpec, Resource};
use crate::repo::resource_repo::{ResourceRepository, SqliteResourceRepository};
use crate::repo::{StoreError, StoreResult};
use crate::source::RowSource;
use log::info;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use std::collections::HashSet;

/// Internal surrogate key column of every data table.
pub const ROW_ID_COLUMN: &str = "_id";

/// Result of [`ResourceMaterializer::make_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOutcome {
    Created,
    AlreadyCreated,
}

/// Result of [`ResourceMaterializer::load_resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { rows: usize },
    AlreadyLoaded,
}

/// Both outcomes of [`ResourceMaterializer::materialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Materialized {
    pub table: TableOutcome,
    pub load: LoadOutcome,
}

/// Storage type for an abstract column datatype.
pub fn storage_type(datatype: &str) -> &'static str {
    match datatype.trim().to_lowercase().as_str() {
        "integer" | "int" => "INTEGER",
        "number" | "float" | "decimal" | "real" => "REAL",
        "boolean" | "bool" => "INTEGER",
        _ => "TEXT",
    }
}

/// Rejects schemas whose headers would collide as data table columns.
///
/// # Errors
/// `InvalidData` naming the resource and the offending header.
pub fn check_columns(resource_name: &str, columns: &[ColumnSpec]) -> StoreResult<()> {
    let mut seen = HashSet::with_capacity(columns.len() + 1);
    seen.insert(ROW_ID_COLUMN.to_string());
    for column in columns {
        if !seen.insert(column.header.to_ascii_lowercase()) {
            return Err(StoreError::InvalidData(format!(
                "resource `{resource_name}` has a clashing column header `{}`",
                column.header
            )));
        }
    }
    Ok(())
}

/// `CREATE TABLE` statement for a resource schema.
pub fn create_table_sql(table_name: &str, columns: &[ColumnSpec]) -> String {
    let mut definitions = vec![format!("{} INTEGER PRIMARY KEY", quote_identifier(ROW_ID_COLUMN))];
    definitions.extend(columns.iter().map(|column| {
        format!(
            "{} {}",
            quote_identifier(&column.header),
            storage_type(&column.datatype)
        )
    }));
    format!(
        "CREATE TABLE {} ({});",
        quote_identifier(table_name),
        definitions.join(", ")
    )
}

/// Creates and loads resource tables through one session manager.
pub struct ResourceMaterializer<'m> {
    sessions: &'m SessionManager,
}

impl<'m> ResourceMaterializer<'m> {
    pub fn new(sessions: &'m SessionManager) -> Self {
        Self { sessions }
    }

    /// Creates the data table unless `table_created` is already set.
    ///
    /// `resource` is refreshed with the stored flags afterwards.
    pub fn make_table(&self, resource: &mut Resource) -> StoreResult<TableOutcome> {
        let (outcome, fresh) = self
            .sessions
            .with_session(|session| create_table(session, resource))?;
        *resource = fresh;
        Ok(outcome)
    }

    /// Bulk-loads rows from `source` unless `loaded` is already set.
    ///
    /// # Errors
    /// `InvalidState` when the table was not created yet or the resource has
    /// no source url; row-source failures roll the partial load back.
    pub fn load_resource(
        &self,
        resource: &mut Resource,
        source: &dyn RowSource,
    ) -> StoreResult<LoadOutcome> {
        let (outcome, fresh) = self
            .sessions
            .with_session(|session| load_rows(session, resource, source))?;
        *resource = fresh;
        Ok(outcome)
    }

    /// Runs [`Self::make_table`] then [`Self::load_resource`], each in its own scope.
    pub fn materialize(
        &self,
        resource: &mut Resource,
        source: &dyn RowSource,
    ) -> StoreResult<Materialized> {
        let table = self.make_table(resource)?;
        let load = self.load_resource(resource, source)?;
        Ok(Materialized { table, load })
    }
}

fn create_table(
    session: &Session<'_>,
    resource: &Resource,
) -> StoreResult<(TableOutcome, Resource)> {
    let repo = SqliteResourceRepository::new(session);
    let mut current = reload(&repo, resource)?;
    if current.table_created {
        return Ok((TableOutcome::AlreadyCreated, current));
    }
    check_columns(&current.name, current.schema.get())?;

    session
        .conn()
        .execute_batch(&create_table_sql(&current.table_name, current.schema.get()))?;
    current.table_created = true;
    repo.save_resource(&mut current)?;
    info!(
        "event=resource_table module=materializer status=ok resource_id={} table={} columns={}",
        current.id,
        current.table_name,
        current.schema.len()
    );
    Ok((TableOutcome::Created, current))
}

fn load_rows(
    session: &Session<'_>,
    resource: &Resource,
    source: &dyn RowSource,
) -> StoreResult<(LoadOutcome, Resource)> {
    let repo = SqliteResourceRepository::new(session);
    let mut current = reload(&repo, resource)?;
    if current.loaded {
        return Ok((LoadOutcome::AlreadyLoaded, current));
    }
    if !current.table_created {
        return Err(StoreError::InvalidState(format!(
            "resource `{}` has no table yet",
            current.name
        )));
    }
    let url = current.source_url.clone().ok_or_else(|| {
        StoreError::InvalidState(format!("resource `{}` has no source url", current.name))
    })?;

    info!(
        "event=resource_load module=materializer status=start resource_id={} url={url}",
        current.id
    );
    let rows = insert_rows(session, &current.table_name, &url, source)?;
    current.loaded = true;
    repo.save_resource(&mut current)?;
    info!(
        "event=resource_load module=materializer status=ok resource_id={} rows={rows}",
        current.id
    );
    Ok((LoadOutcome::Loaded { rows }, current))
}

fn reload(repo: &SqliteResourceRepository<'_>, resource: &Resource) -> StoreResult<Resource> {
    repo.get_resource(resource.id)?
        .ok_or_else(|| StoreError::NotFound(format!("resource id={}", resource.id)))
}

fn insert_rows(
    session: &Session<'_>,
    table_name: &str,
    url: &str,
    source: &dyn RowSource,
) -> StoreResult<usize> {
    let conn = session.conn();
    let columns: Vec<String> = table_columns(conn, table_name)?
        .into_iter()
        .map(|column| column.name)
        .filter(|name| name != ROW_ID_COLUMN)
        .collect();

    let sql = if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES;", quote_identifier(table_name))
    } else {
        let names: Vec<String> = columns.iter().map(|name| quote_identifier(name)).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({});",
            quote_identifier(table_name),
            names.join(", "),
            placeholders.join(", ")
        )
    };
    let mut stmt = conn.prepare(&sql)?;

    let mut count = 0usize;
    for row in source.rows(url)? {
        let row = row?;
        let values = columns
            .iter()
            .map(|column| row.get(column).map(to_sql_value).unwrap_or(SqlValue::Null));
        stmt.execute(params_from_iter(values))?;
        count += 1;
    }
    Ok(count)
}

/// Converts one JSON-like cell into a storable value.
pub fn to_sql_value(value: &serde_json::Value) -> SqlValue {
    match value {
        serde_json::Value::Null => SqlValue::Null,
        serde_json::Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        serde_json::Value::Number(number) => match number.as_i64() {
            Some(integer) => SqlValue::Integer(integer),
            None => number
                .as_f64()
                .map(SqlValue::Real)
                .unwrap_or_else(|| SqlValue::Text(number.to_string())),
        },
        serde_json::Value::String(text) => SqlValue::Text(text.clone()),
        nested => SqlValue::Text(nested.to_string()),
    }
}
