//! SQLite storage bootstrap, schema reflection and transactional sessions.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the metadata store.
//! - Apply bootstrap migrations in deterministic order.
//! - Own the single connection behind scoped, reentrant transactions.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Store tables are never touched before migrations succeed.
//! - At most one transaction is open per [`SessionManager`].

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod catalog;
pub mod migrations;
mod open;
mod session;

pub use open::{open_db, open_db_in_memory, OpenOptions};
pub use session::{Session, SessionManager, SessionOptions};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Connection is missing one of the store tables.
    MissingRequiredTable(&'static str),
    /// A flat-nested scope failed, so the shared transaction was rolled back.
    ScopeAborted,
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "store schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "metadata store requires table `{table}`")
            }
            Self::ScopeAborted => {
                write!(f, "transaction rolled back because a nested scope failed")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::ScopeAborted => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
