//! Metadata document store.
//! Flattens term/section/resource trees into SQLite rows and rebuilds them.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod source;

pub use config::{load_config, ConfigError, ManagerConfig};
pub use db::{DbError, DbResult, Session, SessionManager, SessionOptions};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use model::document::{Document, DocumentId, DocumentKey, DocumentSummary, NewDocument};
pub use model::resource::{ColumnSpec, Resource, ResourceId};
pub use model::term::{TermId, TermKind, TermRecord};
pub use model::tracked::{PropertyMap, Tracked, TrackedMap};
pub use model::tree::{DocTree, NodeId, TermNode, TreeError};
pub use repo::{StoreError, StoreResult};
pub use service::manager::{LoadReport, MetadataManager, ResourceSelection};
pub use service::materializer::{LoadOutcome, Materialized, TableOutcome};
pub use service::projector::{ImportReport, StoredDocument};
pub use source::{MemoryRowSource, RowMap, RowSource, RowSourceError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Store schema version this build migrates to.
pub fn schema_version() -> u32 {
    db::migrations::latest_version()
}
