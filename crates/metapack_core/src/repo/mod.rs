//! Repository layer over the metadata store tables.
//!
//! # Responsibility
//! - Define per-entity contracts for documents, terms and resources.
//! - Keep SQL and constraint-code translation inside the persistence boundary.
//!
//! # Invariants
//! - Repositories are only constructible from an active [`Session`], so every
//!   read and write runs inside a transactional scope.
//! - SQLite constraint failures surface as semantic errors, never raw codes.
//!
//! [`Session`]: crate::db::Session

use crate::db::DbError;
use crate::model::document::DocumentValidationError;
use crate::source::RowSourceError;
use rusqlite::ffi;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod document_repo;
pub mod resource_repo;
pub mod term_repo;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-level error for persistence, projection and materialization.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    Validation(DocumentValidationError),
    /// Duplicate `identifier`/`name` (or resource name within a document).
    UniqueConstraintViolation(String),
    /// Broken parent/section/document linkage.
    ReferentialIntegrity(String),
    NotFound(String),
    /// Persisted row can not be turned into a valid read model.
    InvalidData(String),
    /// Operation is not allowed in the record's current state.
    InvalidState(String),
    RowSource(RowSourceError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::UniqueConstraintViolation(detail) => {
                write!(f, "unique constraint violated: {detail}")
            }
            Self::ReferentialIntegrity(detail) => {
                write!(f, "referential integrity violated: {detail}")
            }
            Self::NotFound(what) => write!(f, "not found: {what}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::InvalidState(message) => write!(f, "invalid state: {message}"),
            Self::RowSource(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::RowSource(err) => Some(err),
            Self::UniqueConstraintViolation(_)
            | Self::ReferentialIntegrity(_)
            | Self::NotFound(_)
            | Self::InvalidData(_)
            | Self::InvalidState(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => Self::from(err),
            other => Self::Db(other),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        match constraint_code(&value) {
            Some(ffi::SQLITE_CONSTRAINT_UNIQUE) | Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) => {
                Self::UniqueConstraintViolation(constraint_message(&value))
            }
            Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
                Self::ReferentialIntegrity(constraint_message(&value))
            }
            _ => Self::Db(DbError::Sqlite(value)),
        }
    }
}

impl From<DocumentValidationError> for StoreError {
    fn from(value: DocumentValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RowSourceError> for StoreError {
    fn from(value: RowSourceError) -> Self {
        Self::RowSource(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(format!("json column: {value}"))
    }
}

fn constraint_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Some(inner.extended_code)
        }
        _ => None,
    }
}

fn constraint_message(err: &rusqlite::Error) -> String {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => message.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn int_to_bool(value: i64, column: &'static str) -> StoreResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StoreError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}
