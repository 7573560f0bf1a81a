//! Document projection between trees and relational rows.
//!
//! # Responsibility
//! - Flatten an in-memory [`DocTree`] into document, term and resource rows.
//! - Rebuild an equivalent tree from stored rows, once per loaded document.
//!
//! # Invariants
//! - Terms are written in document order, so every parent and section row
//!   exists (with a smaller id) before the rows that reference it.
//! - Flattening runs inside one session; a failure leaves no partial rows.
//! - Rebuilding is a pure function of the stored rows.

use crate::db::Session;
use crate::model::document::{Document, NewDocument};
use crate::model::resource::{NewResource, Resource};
use crate::model::term::{NewTerm, TermId, TermKind, TermRecord};
use crate::model::tree::{Datafile, DocTree, NodeId, TermData, TermNode};
use crate::repo::document_repo::{DocumentRepository, SqliteDocumentRepository};
use crate::repo::resource_repo::{ResourceRepository, SqliteResourceRepository};
use crate::repo::term_repo::{SqliteTermRepository, TermRepository};
use crate::repo::{StoreError, StoreResult};
use crate::service::materializer::check_columns;
use log::{debug, info};
use once_cell::unsync::OnceCell;
use std::collections::HashMap;

/// Rows written by one import.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub document: Document,
    pub term_count: usize,
    pub resources: Vec<Resource>,
}

/// Flattens `tree` into rows inside the caller's session.
///
/// # Errors
/// - `Validation` when the tree has no `root.identifier` / `root.name`.
/// - `UniqueConstraintViolation` when identifier or name is taken, when two
///   datafiles share a name, or when two datafile names slugify to the same
///   table name. The whole import is rejected, not just the later datafile.
/// - `InvalidData` when a datafile schema has clashing column headers.
/// - `ReferentialIntegrity` when the tree links a node before its parent.
pub fn flatten(session: &Session<'_>, tree: &DocTree) -> StoreResult<ImportReport> {
    let header = NewDocument::from_tree(tree)?;
    info!(
        "event=document_import module=projector status=start name={} nodes={}",
        header.name,
        tree.len()
    );

    let documents = SqliteDocumentRepository::new(session);
    let terms = SqliteTermRepository::new(session);
    let resources = SqliteResourceRepository::new(session);

    let document = documents.insert_document(&header)?;

    // Node id -> persisted term id.
    let mut persisted: Vec<Option<TermId>> = vec![None; tree.len()];
    let mut created = Vec::new();
    let mut term_count = 0usize;

    for node_id in tree.document_order() {
        let node = &tree[node_id];
        let term = node.term();
        let new_term = NewTerm {
            document_id: document.id,
            kind: node.kind(),
            parent_id: resolve_link(&persisted, term.parent, node_id, "parent")?,
            section_id: resolve_link(&persisted, term.section, node_id, "section")?,
            parent_term: term.parent_term.clone(),
            record_term: term.record_term.clone(),
            term_value_name: term.term_value_name.clone(),
            value: term.value.clone(),
            properties: term.properties.clone(),
        };
        let term_id = terms.insert_term(&new_term)?;
        persisted[node_id] = Some(term_id);
        term_count += 1;

        if node.is_datafile() {
            created.push(resources.insert_resource(&companion_resource(
                &document, term_id, node,
            )?)?);
        }
    }

    info!(
        "event=document_import module=projector status=ok document_id={} terms={} resources={}",
        document.id,
        term_count,
        created.len()
    );
    Ok(ImportReport {
        document,
        term_count,
        resources: created,
    })
}

fn resolve_link(
    persisted: &[Option<TermId>],
    link: Option<NodeId>,
    node_id: NodeId,
    role: &str,
) -> StoreResult<Option<TermId>> {
    match link {
        None => Ok(None),
        Some(target) => persisted
            .get(target)
            .copied()
            .flatten()
            .map(Some)
            .ok_or_else(|| {
                StoreError::ReferentialIntegrity(format!(
                    "node {node_id} references {role} node {target} before it was written"
                ))
            }),
    }
}

fn companion_resource(
    document: &Document,
    term_id: TermId,
    node: &TermNode,
) -> StoreResult<NewResource> {
    let name = node.resource_name().ok_or_else(|| {
        StoreError::InvalidData(format!("datafile term {term_id} has no resource name"))
    })?;
    let datafile = node.datafile().ok_or_else(|| {
        StoreError::InvalidData(format!("datafile term {term_id} has no datafile details"))
    })?;
    check_columns(&name, &datafile.columns)?;
    Ok(NewResource {
        document_id: document.id,
        resource_term_id: term_id,
        table_name: Resource::make_table_name(document.id, &name),
        name,
        source_url: Some(datafile.resolved_url.clone()),
        schema: datafile.columns.clone(),
    })
}

/// Tree rebuilt from rows plus the term id to node id mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Rebuilt {
    pub tree: DocTree,
    pub node_of: HashMap<TermId, NodeId>,
}

/// Rebuilds a tree by replaying `terms` in id order.
///
/// # Errors
/// `InvalidData` when the first term is not the root, when a second root
/// appears, or when a term references an id that was not seen before it.
pub fn rebuild(
    document: &Document,
    terms: &[TermRecord],
    resources: &[Resource],
) -> StoreResult<Rebuilt> {
    let mut ordered: Vec<&TermRecord> = terms.iter().collect();
    ordered.sort_by_key(|term| term.id);

    let mut iter = ordered.into_iter();
    let root = iter.next().ok_or_else(|| {
        StoreError::InvalidData(format!("document {} has no terms", document.id))
    })?;
    if root.kind != TermKind::Root {
        return Err(StoreError::InvalidData(format!(
            "document {} starts with a `{}` term instead of the root",
            document.id,
            root.kind.as_str()
        )));
    }

    let datafiles: HashMap<TermId, &Resource> = resources
        .iter()
        .map(|resource| (resource.resource_term_id, resource))
        .collect();

    let mut tree = DocTree::with_root(term_data(root, None, None));
    let mut node_of = HashMap::with_capacity(terms.len());
    node_of.insert(root.id, tree.root());

    for record in iter {
        if record.kind == TermKind::Root {
            return Err(StoreError::InvalidData(format!(
                "document {} has a second root term {}",
                document.id, record.id
            )));
        }
        let parent = lookup_node(&node_of, record, record.parent_id, "parent")?;
        let section = lookup_node(&node_of, record, record.section_id, "section")?;
        let datafile = if record.kind.is_resource() {
            datafiles.get(&record.id).map(|resource| Datafile {
                resolved_url: resource.source_url.clone().unwrap_or_default(),
                columns: resource.schema.get().clone(),
            })
        } else {
            None
        };

        let node = TermNode::from_kind(record.kind, term_data(record, parent, section), datafile);
        let node_id = tree.attach(node);
        node_of.insert(record.id, node_id);
    }

    if let Some(reference) = &document.reference {
        tree.set_reference(reference.clone());
    }
    if let Some(package_url) = &document.package_url {
        tree.set_package_url(package_url.clone());
    }
    tree.set_declarations(
        document.decl_sections.get().clone(),
        document.decl_terms.get().clone(),
        document.derived_terms.get().clone(),
        document.super_terms.get().clone(),
    );

    debug!(
        "event=document_rebuild module=projector status=ok document_id={} nodes={}",
        document.id,
        tree.len()
    );
    Ok(Rebuilt { tree, node_of })
}

fn lookup_node(
    node_of: &HashMap<TermId, NodeId>,
    record: &TermRecord,
    link: Option<TermId>,
    role: &str,
) -> StoreResult<Option<NodeId>> {
    match link {
        None => Ok(None),
        Some(target) => node_of.get(&target).copied().map(Some).ok_or_else(|| {
            StoreError::InvalidData(format!(
                "term {} references unseen {role} term {target}",
                record.id
            ))
        }),
    }
}

fn term_data(record: &TermRecord, parent: Option<NodeId>, section: Option<NodeId>) -> TermData {
    let mut data = TermData::new(
        &record.parent_term,
        &record.record_term,
        record.value.clone(),
        parent,
        section,
    );
    data.term_value_name = record.term_value_name.clone();
    data.properties = record.properties.get().clone();
    data
}

/// A stored document with its rows and a lazily rebuilt tree.
#[derive(Debug)]
pub struct StoredDocument {
    document: Document,
    terms: Vec<TermRecord>,
    resources: Vec<Resource>,
    rebuilt: OnceCell<Rebuilt>,
}

impl StoredDocument {
    /// Reads every term and resource of `document` inside `session`.
    pub fn load(session: &Session<'_>, document: Document) -> StoreResult<Self> {
        let terms = SqliteTermRepository::new(session).list_terms(document.id)?;
        let resources = SqliteResourceRepository::new(session).list_resources(document.id)?;
        Ok(Self::from_rows(document, terms, resources))
    }

    pub fn from_rows(document: Document, terms: Vec<TermRecord>, resources: Vec<Resource>) -> Self {
        Self {
            document,
            terms,
            resources,
            rebuilt: OnceCell::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn terms(&self) -> &[TermRecord] {
        &self.terms
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Whether the tree has been rebuilt yet.
    pub fn is_rebuilt(&self) -> bool {
        self.rebuilt.get().is_some()
    }

    /// Rebuilt tree; built on first access and reused afterwards.
    pub fn tree(&self) -> StoreResult<&DocTree> {
        Ok(&self.rebuilt()?.tree)
    }

    /// Node built for the stored term `term_id`.
    pub fn node_for_term(&self, term_id: TermId) -> StoreResult<Option<NodeId>> {
        Ok(self.rebuilt()?.node_of.get(&term_id).copied())
    }

    /// Member nodes of the named section, in insertion order.
    pub fn section_terms(&self, name: &str) -> StoreResult<Vec<NodeId>> {
        Ok(self.tree()?.section_terms(name))
    }

    fn rebuilt(&self) -> StoreResult<&Rebuilt> {
        self.rebuilt
            .get_or_try_init(|| rebuild(&self.document, &self.terms, &self.resources))
    }
}
