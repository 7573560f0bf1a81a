//! Row sources feeding resource loads.
//!
//! # Responsibility
//! - Abstract "give me the rows behind this URL" away from the store.
//! - Provide an in-memory source for tests and embedding callers.
//!
//! # Invariants
//! - Rows are column-name keyed maps; unknown keys are ignored by loaders.
//! - A source never touches the database.

use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One source row keyed by column header.
pub type RowMap = BTreeMap<String, serde_json::Value>;

/// Boxed row stream returned by [`RowSource::rows`].
pub type RowIter<'a> = Box<dyn Iterator<Item = Result<RowMap, RowSourceError>> + 'a>;

/// Row-source failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSourceError {
    /// No rows are registered for the URL.
    UnknownUrl(String),
    /// Reading or decoding a row failed.
    Read { url: String, message: String },
}

impl Display for RowSourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownUrl(url) => write!(f, "no row source for url: {url}"),
            Self::Read { url, message } => write!(f, "failed to read rows from {url}: {message}"),
        }
    }
}

impl Error for RowSourceError {}

/// Supplies rows for a resolved datafile URL.
pub trait RowSource {
    fn rows<'a>(&'a self, url: &str) -> Result<RowIter<'a>, RowSourceError>;
}

/// Row source backed by rows registered per URL.
#[derive(Debug, Clone, Default)]
pub struct MemoryRowSource {
    rows: HashMap<String, Vec<RowMap>>,
}

impl MemoryRowSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the rows behind `url`.
    pub fn insert(&mut self, url: impl Into<String>, rows: Vec<RowMap>) {
        self.rows.insert(url.into(), rows);
    }

    /// Builder form of [`MemoryRowSource::insert`].
    pub fn with_rows(mut self, url: impl Into<String>, rows: Vec<RowMap>) -> Self {
        self.insert(url, rows);
        self
    }
}

impl RowSource for MemoryRowSource {
    fn rows<'a>(&'a self, url: &str) -> Result<RowIter<'a>, RowSourceError> {
        let rows = self
            .rows
            .get(url)
            .ok_or_else(|| RowSourceError::UnknownUrl(url.to_string()))?;
        Ok(Box::new(rows.iter().cloned().map(Ok)))
    }
}

/// Builds a [`RowMap`] from `(column, value)` pairs.
pub fn row<K, V, I>(pairs: I) -> RowMap
where
    K: Into<String>,
    V: Into<serde_json::Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}
