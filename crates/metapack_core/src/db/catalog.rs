//! Schema catalog: reflection over the tables present in a store.
//!
//! # Responsibility
//! - List, check, describe and drop tables on a live connection.
//! - Verify that a connection carries the migrated store schema.
//!
//! # Invariants
//! - SQLite internal tables (`sqlite_*`) are never reported or dropped.
//! - Identifiers passed into DDL are always quoted via [`quote_identifier`].

use super::migrations::{current_version, latest_version};
use super::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

/// Tables the store cannot operate without.
pub const STORE_TABLES: [&str; 3] = ["mt_documents", "mt_terms", "mt_resources"];

/// One column reflected from `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    /// Declared type as written in DDL, upper-cased by SQLite conventions.
    pub declared_type: String,
    pub primary_key: bool,
}

/// Lists user tables in name order.
pub fn list_tables(conn: &Connection) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name
         FROM sqlite_master
         WHERE type = 'table'
           AND name NOT LIKE 'sqlite_%'
         ORDER BY name ASC;",
    )?;
    let mut rows = stmt.query([])?;
    let mut tables = Vec::new();
    while let Some(row) = rows.next()? {
        tables.push(row.get(0)?);
    }
    Ok(tables)
}

pub fn has_table(conn: &Connection, table: &str) -> DbResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Reflects the columns of `table` in declaration order.
///
/// Returns an empty list when the table does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> DbResult<Vec<TableColumn>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", quote_identifier(table)))?;
    let mut rows = stmt.query([])?;
    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        columns.push(TableColumn {
            name: row.get(1)?,
            declared_type: row.get(2)?,
            primary_key: row.get::<_, i64>(5)? > 0,
        });
    }
    Ok(columns)
}

/// Drops `table` if present and reports whether anything was dropped.
pub fn drop_table(conn: &Connection, table: &str) -> DbResult<bool> {
    if table.starts_with("sqlite_") || !has_table(conn, table)? {
        return Ok(false);
    }
    conn.execute_batch(&format!("DROP TABLE {};", quote_identifier(table)))?;
    info!("event=table_drop module=catalog status=ok table={table}");
    Ok(true)
}

/// Quotes an SQL identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Checks the connection is migrated to this binary's schema.
pub fn verify_store_schema(conn: &Connection) -> DbResult<()> {
    let latest = latest_version();
    let actual = current_version(conn)?;
    if actual > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: actual,
            latest_supported: latest,
        });
    }

    for table in STORE_TABLES {
        if !has_table(conn, table)? {
            return Err(DbError::MissingRequiredTable(table));
        }
    }
    Ok(())
}
