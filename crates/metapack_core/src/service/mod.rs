//! Store use-case services.
//!
//! # Responsibility
//! - Project document trees into rows and back.
//! - Materialize resource data tables.
//! - Expose the manager facade callers build on.

pub mod manager;
pub mod materializer;
pub mod projector;
