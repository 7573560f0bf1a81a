//! Domain model for stored metadata documents.
//!
//! # Responsibility
//! - Row shapes for documents, terms and resources.
//! - The arena-backed document tree exchanged with the parser boundary.
//! - Change-tracked containers for JSON-encoded columns.
//!
//! # Invariants
//! - Term behavior is selected by [`term::TermKind`] alone.
//! - Tree links are arena indices; row links are surrogate ids.

pub mod document;
pub mod resource;
pub mod term;
pub mod tracked;
pub mod tree;
