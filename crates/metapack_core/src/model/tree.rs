//! In-memory metadata document tree.
//!
//! # Responsibility
//! - Hold the parsed document handed over by the parser boundary.
//! - Hold trees rebuilt from stored term rows.
//!
//! # Invariants
//! - Nodes live in an arena; links are [`NodeId`] indices, never pointers.
//! - Node `0` is the root section and the only `Root` node.
//! - A node's parent and section always have smaller ids than the node.
//! - Every non-root node has a section that is a `Root` or `Section` node.

use super::resource::ColumnSpec;
use super::term::{qualified_name, TermKind};
use super::tracked::PropertyMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::ops::Index;

/// Arena index of one tree node.
pub type NodeId = usize;

const ROOT: NodeId = 0;
const ROOT_TERM: &str = "root";
const DATAFILE_TERM: &str = "datafile";

/// Tree construction errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    UnknownNode(NodeId),
    /// Node can not hold section members.
    NotASection(NodeId),
    /// Sections and roots can not be nested under terms.
    NotATerm(NodeId),
    /// Section kinds must be added through [`DocTree::add_section`].
    SectionKind(TermKind),
    DuplicateSection(String),
}

impl Display for TreeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownNode(id) => write!(f, "tree node not found: {id}"),
            Self::NotASection(id) => write!(f, "tree node is not a section: {id}"),
            Self::NotATerm(id) => write!(f, "tree node can not hold child terms: {id}"),
            Self::SectionKind(kind) => {
                write!(f, "`{}` terms must be added as sections", kind.as_str())
            }
            Self::DuplicateSection(name) => write!(f, "section already exists: {name}"),
        }
    }
}

impl Error for TreeError {}

/// Fields shared by every term variant.
#[derive(Debug, Clone, PartialEq)]
pub struct TermData {
    pub parent_term: String,
    pub record_term: String,
    pub term_value_name: Option<String>,
    pub value: Option<String>,
    pub properties: PropertyMap,
    pub parent: Option<NodeId>,
    pub section: Option<NodeId>,
    /// Directly nested terms, in insertion order.
    pub children: Vec<NodeId>,
}

impl TermData {
    pub fn new(
        parent_term: &str,
        record_term: &str,
        value: Option<String>,
        parent: Option<NodeId>,
        section: Option<NodeId>,
    ) -> Self {
        Self {
            parent_term: parent_term.to_lowercase(),
            record_term: record_term.to_lowercase(),
            term_value_name: None,
            value,
            properties: PropertyMap::new(),
            parent,
            section,
            children: Vec::new(),
        }
    }
}

/// Resolved location and column layout of a datafile term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datafile {
    pub resolved_url: String,
    pub columns: Vec<ColumnSpec>,
}

/// One node, tagged by term kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TermNode {
    Plain(TermData),
    Section {
        term: TermData,
        members: Vec<NodeId>,
    },
    Root {
        term: TermData,
        members: Vec<NodeId>,
    },
    Resource {
        term: TermData,
        datafile: Option<Datafile>,
    },
    Distribution {
        term: TermData,
        datafile: Option<Datafile>,
    },
}

impl TermNode {
    /// Builds the variant selected by `kind`.
    pub fn from_kind(kind: TermKind, term: TermData, datafile: Option<Datafile>) -> Self {
        match kind {
            TermKind::Plain => Self::Plain(term),
            TermKind::Section => Self::Section {
                term,
                members: Vec::new(),
            },
            TermKind::Root => Self::Root {
                term,
                members: Vec::new(),
            },
            TermKind::Resource => Self::Resource { term, datafile },
            TermKind::Distribution => Self::Distribution { term, datafile },
        }
    }

    pub fn kind(&self) -> TermKind {
        match self {
            Self::Plain(_) => TermKind::Plain,
            Self::Section { .. } => TermKind::Section,
            Self::Root { .. } => TermKind::Root,
            Self::Resource { .. } => TermKind::Resource,
            Self::Distribution { .. } => TermKind::Distribution,
        }
    }

    pub fn term(&self) -> &TermData {
        match self {
            Self::Plain(term)
            | Self::Section { term, .. }
            | Self::Root { term, .. }
            | Self::Resource { term, .. }
            | Self::Distribution { term, .. } => term,
        }
    }

    pub fn term_mut(&mut self) -> &mut TermData {
        match self {
            Self::Plain(term)
            | Self::Section { term, .. }
            | Self::Root { term, .. }
            | Self::Resource { term, .. }
            | Self::Distribution { term, .. } => term,
        }
    }

    /// Section members; empty for non-section nodes.
    pub fn members(&self) -> &[NodeId] {
        match self {
            Self::Section { members, .. } | Self::Root { members, .. } => members,
            _ => &[],
        }
    }

    pub fn datafile(&self) -> Option<&Datafile> {
        match self {
            Self::Resource { datafile, .. } | Self::Distribution { datafile, .. } => {
                datafile.as_ref()
            }
            _ => None,
        }
    }

    /// `parent_term.record_term`.
    pub fn qualified_name(&self) -> String {
        let term = self.term();
        qualified_name(&term.parent_term, &term.record_term)
    }

    pub fn value(&self) -> Option<&str> {
        self.term().value.as_deref()
    }

    /// Whether this node references a datafile that needs a resource row.
    pub fn is_datafile(&self) -> bool {
        let term = self.term();
        self.kind() == TermKind::Resource
            && term.parent_term == ROOT_TERM
            && term.record_term == DATAFILE_TERM
            && self.datafile().is_some()
    }

    /// Resource name: the `name` property, falling back to the value.
    pub fn resource_name(&self) -> Option<String> {
        let term = self.term();
        match term.properties.get("name") {
            Some(serde_json::Value::String(name)) => Some(name.clone()),
            Some(other) if !other.is_null() => Some(other.to_string()),
            _ => term.value.clone(),
        }
    }

    fn members_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match self {
            Self::Section { members, .. } | Self::Root { members, .. } => Some(members),
            _ => None,
        }
    }
}

/// Id-agnostic description of one node, for structural comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct TermOutline {
    pub kind: TermKind,
    pub qualified_name: String,
    pub term_value_name: Option<String>,
    pub value: Option<String>,
    pub properties: PropertyMap,
    /// Position of the parent in document order.
    pub parent: Option<usize>,
    /// Position of the section in document order.
    pub section: Option<usize>,
}

/// Arena-backed document tree.
#[derive(Debug, Clone, PartialEq)]
pub struct DocTree {
    nodes: Vec<TermNode>,
    sections: Vec<NodeId>,
    reference: Option<String>,
    package_url: Option<String>,
    decl_sections: PropertyMap,
    decl_terms: PropertyMap,
    derived_terms: PropertyMap,
    super_terms: PropertyMap,
}

impl Default for DocTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DocTree {
    /// Creates a tree holding only the root section.
    pub fn new() -> Self {
        Self::with_root(TermData::new(ROOT_TERM, ROOT_TERM, None, None, None))
    }

    pub(crate) fn with_root(term: TermData) -> Self {
        Self {
            nodes: vec![TermNode::from_kind(TermKind::Root, term, None)],
            sections: Vec::new(),
            reference: None,
            package_url: None,
            decl_sections: PropertyMap::new(),
            decl_terms: PropertyMap::new(),
            derived_terms: PropertyMap::new(),
            super_terms: PropertyMap::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        ROOT
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`; a tree holds at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&TermNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut TermNode> {
        self.nodes.get_mut(id)
    }

    /// Non-root sections, in insertion order.
    pub fn sections(&self) -> &[NodeId] {
        &self.sections
    }

    /// Finds a section (or the root, for `"root"`) by case-insensitive name.
    pub fn section(&self, name: &str) -> Option<NodeId> {
        let wanted = name.to_lowercase();
        if wanted == ROOT_TERM {
            return Some(ROOT);
        }
        self.sections
            .iter()
            .copied()
            .find(|id| self.nodes[*id].term().record_term == wanted)
    }

    /// Member terms of the named section.
    pub fn section_terms(&self, name: &str) -> Vec<NodeId> {
        self.section(name)
            .map(|id| self.nodes[id].members().to_vec())
            .unwrap_or_default()
    }

    /// Adds a section under the root.
    pub fn add_section(&mut self, name: &str) -> Result<NodeId, TreeError> {
        if self.section(name).is_some() {
            return Err(TreeError::DuplicateSection(name.to_lowercase()));
        }
        let term = TermData::new(ROOT_TERM, name, None, None, Some(ROOT));
        Ok(self.attach(TermNode::from_kind(TermKind::Section, term, None)))
    }

    /// Adds a plain top-level term to a section.
    pub fn add_term(
        &mut self,
        section: NodeId,
        record_term: &str,
        value: Option<&str>,
    ) -> Result<NodeId, TreeError> {
        self.add_typed_term(section, TermKind::Plain, record_term, value)
    }

    /// Adds a top-level term of any non-section kind to a section.
    pub fn add_typed_term(
        &mut self,
        section: NodeId,
        kind: TermKind,
        record_term: &str,
        value: Option<&str>,
    ) -> Result<NodeId, TreeError> {
        if kind.is_section() {
            return Err(TreeError::SectionKind(kind));
        }
        self.ensure_section(section)?;
        let term = TermData::new(
            ROOT_TERM,
            record_term,
            value.map(str::to_string),
            None,
            Some(section),
        );
        Ok(self.attach(TermNode::from_kind(kind, term, None)))
    }

    /// Adds a datafile reference to a section.
    pub fn add_datafile(
        &mut self,
        section: NodeId,
        name: &str,
        url: &str,
        columns: Vec<ColumnSpec>,
    ) -> Result<NodeId, TreeError> {
        self.ensure_section(section)?;
        let mut term = TermData::new(
            ROOT_TERM,
            DATAFILE_TERM,
            Some(url.to_string()),
            None,
            Some(section),
        );
        term.term_value_name = Some("url".to_string());
        term.properties
            .insert("name".to_string(), serde_json::Value::String(name.to_string()));
        let datafile = Datafile {
            resolved_url: url.to_string(),
            columns,
        };
        Ok(self.attach(TermNode::from_kind(
            TermKind::Resource,
            term,
            Some(datafile),
        )))
    }

    /// Nests a plain term under an existing term.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        record_term: &str,
        value: Option<&str>,
    ) -> Result<NodeId, TreeError> {
        let parent_node = self.nodes.get(parent).ok_or(TreeError::UnknownNode(parent))?;
        if parent_node.kind().is_section() {
            return Err(TreeError::NotATerm(parent));
        }
        let parent_term = parent_node.term();
        let term = TermData::new(
            &parent_term.record_term,
            record_term,
            value.map(str::to_string),
            Some(parent),
            parent_term.section,
        );
        Ok(self.attach(TermNode::from_kind(TermKind::Plain, term, None)))
    }

    pub fn set_property(
        &mut self,
        node: NodeId,
        key: &str,
        value: impl Into<serde_json::Value>,
    ) -> Result<(), TreeError> {
        let node_ref = self.nodes.get_mut(node).ok_or(TreeError::UnknownNode(node))?;
        node_ref
            .term_mut()
            .properties
            .insert(key.to_string(), value.into());
        Ok(())
    }

    pub fn set_term_value_name(&mut self, node: NodeId, name: &str) -> Result<(), TreeError> {
        let node_ref = self.nodes.get_mut(node).ok_or(TreeError::UnknownNode(node))?;
        node_ref.term_mut().term_value_name = Some(name.to_string());
        Ok(())
    }

    /// Nested terms of `node`, depth first, excluding `node` itself.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Some(start) = self.nodes.get(node) {
            let mut stack: Vec<NodeId> = start.term().children.iter().rev().copied().collect();
            while let Some(current) = stack.pop() {
                out.push(current);
                stack.extend(self.nodes[current].term().children.iter().rev().copied());
            }
        }
        out
    }

    /// Root, root members, then each section with its members, every member
    /// followed by its descendants.
    pub fn document_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        order.push(ROOT);
        self.push_members(ROOT, &mut order);
        for section in &self.sections {
            order.push(*section);
            self.push_members(*section, &mut order);
        }
        order
    }

    /// All nodes with the given dotted name, in document order.
    pub fn find(&self, qualified: &str) -> Vec<NodeId> {
        let wanted = qualified.to_lowercase();
        self.document_order()
            .into_iter()
            .filter(|id| self.nodes[*id].qualified_name() == wanted)
            .collect()
    }

    /// Value of the first node with the given dotted name.
    pub fn find_value(&self, qualified: &str) -> Option<&str> {
        self.find(qualified)
            .first()
            .and_then(|id| self.nodes[*id].value())
    }

    /// Structural description in document order, independent of node ids.
    pub fn outline(&self) -> Vec<TermOutline> {
        let order = self.document_order();
        let mut position = vec![None; self.nodes.len()];
        for (index, id) in order.iter().enumerate() {
            position[*id] = Some(index);
        }
        order
            .iter()
            .map(|id| {
                let node = &self.nodes[*id];
                let term = node.term();
                TermOutline {
                    kind: node.kind(),
                    qualified_name: node.qualified_name(),
                    term_value_name: term.term_value_name.clone(),
                    value: term.value.clone(),
                    properties: term.properties.clone(),
                    parent: term.parent.and_then(|p| position[p]),
                    section: term.section.and_then(|s| position[s]),
                }
            })
            .collect()
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn set_reference(&mut self, reference: impl Into<String>) {
        self.reference = Some(reference.into());
    }

    pub fn package_url(&self) -> Option<&str> {
        self.package_url.as_deref()
    }

    pub fn set_package_url(&mut self, package_url: impl Into<String>) {
        self.package_url = Some(package_url.into());
    }

    pub fn decl_sections(&self) -> &PropertyMap {
        &self.decl_sections
    }

    pub fn decl_terms(&self) -> &PropertyMap {
        &self.decl_terms
    }

    pub fn derived_terms(&self) -> &PropertyMap {
        &self.derived_terms
    }

    pub fn super_terms(&self) -> &PropertyMap {
        &self.super_terms
    }

    /// Replaces the four declaration maps carried alongside the terms.
    pub fn set_declarations(
        &mut self,
        decl_sections: PropertyMap,
        decl_terms: PropertyMap,
        derived_terms: PropertyMap,
        super_terms: PropertyMap,
    ) {
        self.decl_sections = decl_sections;
        self.decl_terms = decl_terms;
        self.derived_terms = derived_terms;
        self.super_terms = super_terms;
    }

    /// Appends a node and links it to its section or parent.
    ///
    /// Callers guarantee the referenced parent/section ids already exist.
    pub(crate) fn attach(&mut self, node: TermNode) -> NodeId {
        let id = self.nodes.len();
        let kind = node.kind();
        let parent = node.term().parent;
        let section = node.term().section;
        self.nodes.push(node);

        if kind == TermKind::Section {
            self.sections.push(id);
        } else if let Some(parent) = parent {
            self.nodes[parent].term_mut().children.push(id);
        } else if let Some(members) = section.and_then(|s| self.nodes[s].members_mut()) {
            members.push(id);
        }
        id
    }

    fn ensure_section(&self, id: NodeId) -> Result<(), TreeError> {
        let node = self.nodes.get(id).ok_or(TreeError::UnknownNode(id))?;
        if !node.kind().is_section() {
            return Err(TreeError::NotASection(id));
        }
        Ok(())
    }

    fn push_members(&self, section: NodeId, order: &mut Vec<NodeId>) {
        for member in self.nodes[section].members() {
            order.push(*member);
            order.extend(self.descendants(*member));
        }
    }
}

impl Index<NodeId> for DocTree {
    type Output = TermNode;

    fn index(&self, id: NodeId) -> &TermNode {
        &self.nodes[id]
    }
}
