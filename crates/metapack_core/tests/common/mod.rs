#![allow(dead_code)]

use metapack_core::source::row;
use metapack_core::{ColumnSpec, DocTree, MemoryRowSource, RowMap};
use serde_json::json;
use uuid::Uuid;

pub const PEOPLE_URL: &str = "mem://example.com/people.csv";

pub fn people_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("id", "integer"),
        ColumnSpec::new("name", "string").with_description("Display name"),
    ]
}

pub fn people_rows() -> Vec<RowMap> {
    vec![
        row([("id", json!(1)), ("name", json!("ada"))]),
        row([("id", json!(2)), ("name", json!("grace"))]),
        row([("id", json!(3)), ("name", json!("edsger"))]),
    ]
}

pub fn people_source() -> MemoryRowSource {
    MemoryRowSource::new().with_rows(PEOPLE_URL, people_rows())
}

pub fn unique_identifier() -> String {
    Uuid::new_v4().to_string()
}

/// Root header terms, a nested contact term and one datafile.
pub fn document_tree(name: &str, reference: &str) -> DocTree {
    let mut tree = DocTree::new();
    let root = tree.root();
    tree.add_term(root, "Identifier", Some(unique_identifier().as_str()))
        .unwrap();
    tree.add_term(root, "Name", Some(name)).unwrap();
    tree.add_term(root, "Title", Some("Example document"))
        .unwrap();
    tree.set_reference(reference);

    let contacts = tree.add_section("Contacts").unwrap();
    let creator = tree.add_term(contacts, "Creator", Some("Ada")).unwrap();
    tree.set_property(creator, "role", "author").unwrap();
    tree.add_child(creator, "Email", Some("ada@example.com"))
        .unwrap();

    let resources = tree.add_section("Resources").unwrap();
    tree.add_datafile(resources, "people", PEOPLE_URL, people_columns())
        .unwrap();
    tree
}

/// One root, one section and `leaves` non-section terms, one of which is a
/// two-column datafile. `leaves` must be at least 3.
pub fn scenario_tree(leaves: usize) -> DocTree {
    assert!(leaves >= 3, "identifier, name and datafile are required");
    let mut tree = DocTree::new();
    let root = tree.root();
    tree.add_term(root, "Identifier", Some(unique_identifier().as_str()))
        .unwrap();
    tree.add_term(root, "Name", Some("example.com-scenario-1"))
        .unwrap();

    let resources = tree.add_section("Resources").unwrap();
    tree.add_datafile(resources, "people", PEOPLE_URL, people_columns())
        .unwrap();
    for index in 0..leaves - 3 {
        tree.add_term(resources, "Note", Some(format!("note {index}").as_str()))
            .unwrap();
    }
    tree
}
