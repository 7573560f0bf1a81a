mod common;

use common::{document_tree, unique_identifier};
use metapack_core::model::term::NewTerm;
use metapack_core::repo::resource_repo::{ResourceRepository, SqliteResourceRepository};
use metapack_core::repo::term_repo::{SqliteTermRepository, TermRepository};
use metapack_core::{
    ColumnSpec, DocTree, DocumentKey, MetadataManager, PropertyMap, StoreError, TermKind,
};
use serde_json::json;

fn header_tree(identifier: &str, name: &str) -> DocTree {
    let mut tree = DocTree::new();
    let root = tree.root();
    tree.add_term(root, "Identifier", Some(identifier)).unwrap();
    tree.add_term(root, "Name", Some(name)).unwrap();
    let notes = tree.add_section("Notes").unwrap();
    tree.add_term(notes, "Note", Some("kept")).unwrap();
    tree
}

fn term_count(manager: &MetadataManager) -> i64 {
    manager
        .with_session(|s| SqliteTermRepository::new(s).count_terms(None))
        .unwrap()
}

fn plain_term(document_id: i64, section_id: Option<i64>) -> NewTerm {
    NewTerm {
        document_id,
        kind: TermKind::Plain,
        parent_id: None,
        section_id,
        parent_term: "root".to_string(),
        record_term: "orphan".to_string(),
        term_value_name: None,
        value: Some("x".to_string()),
        properties: PropertyMap::new(),
    }
}

#[test]
fn duplicate_name_fails_and_leaves_first_import_intact() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let first = manager
        .import_document(&header_tree(&unique_identifier(), "shared-name"))
        .unwrap();

    let err = manager
        .import_document(&header_tree(&unique_identifier(), "shared-name"))
        .unwrap_err();
    assert!(matches!(err, StoreError::UniqueConstraintViolation(_)));

    assert_eq!(manager.documents().unwrap().len(), 1);
    assert_eq!(term_count(&manager), first.term_count as i64);
}

#[test]
fn duplicate_identifier_fails_with_unique_violation() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let identifier = unique_identifier();
    manager
        .import_document(&header_tree(&identifier, "first"))
        .unwrap();

    let err = manager
        .import_document(&header_tree(&identifier, "second"))
        .unwrap_err();
    assert!(matches!(err, StoreError::UniqueConstraintViolation(_)));
    assert!(manager
        .document(&DocumentKey::Name("second".to_string()))
        .unwrap()
        .is_none());
}

#[test]
fn delete_cascades_to_terms_and_resources() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let report = manager
        .import_document(&document_tree("cascade", "http://example.com/cascade.csv"))
        .unwrap();
    assert_eq!(report.resources.len(), 1);
    assert!(term_count(&manager) > 0);

    manager
        .delete_document(&DocumentKey::Name("cascade".to_string()))
        .unwrap();

    assert!(manager.documents().unwrap().is_empty());
    assert_eq!(term_count(&manager), 0);
    let resources = manager
        .with_session(|s| SqliteResourceRepository::new(s).list_resources(report.document.id))
        .unwrap();
    assert!(resources.is_empty());
}

#[test]
fn deleting_a_missing_document_is_not_found() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let err = manager
        .delete_document(&DocumentKey::Id(404))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn term_linkage_is_validated_before_insert() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let report = manager
        .import_document(&document_tree("linkage", "http://example.com/linkage.csv"))
        .unwrap();
    let document_id = report.document.id;
    let terms = manager
        .with_session(|s| SqliteTermRepository::new(s).list_terms(document_id))
        .unwrap();
    let plain_id = terms
        .iter()
        .find(|term| term.kind == TermKind::Plain)
        .unwrap()
        .id;

    let cases = [
        plain_term(document_id, None),
        plain_term(document_id, Some(9_999)),
        plain_term(document_id, Some(plain_id)),
    ];
    for case in cases {
        let err = manager
            .with_session(|s| SqliteTermRepository::new(s).insert_term(&case))
            .unwrap_err();
        assert!(
            matches!(err, StoreError::ReferentialIntegrity(_)),
            "unexpected error: {err}"
        );
    }

    let other = manager
        .import_document(&document_tree("other", "http://example.com/other.csv"))
        .unwrap();
    let mut foreign = plain_term(other.document.id, None);
    foreign.section_id = terms
        .iter()
        .find(|term| term.kind == TermKind::Root)
        .map(|term| term.id);
    let err = manager
        .with_session(|s| SqliteTermRepository::new(s).insert_term(&foreign))
        .unwrap_err();
    assert!(matches!(err, StoreError::ReferentialIntegrity(_)));

    // Parent from the other document, section from this one.
    let section_id = terms
        .iter()
        .find(|term| term.kind == TermKind::Section)
        .map(|term| term.id);
    let mut adopted = plain_term(document_id, section_id);
    adopted.parent_id = manager
        .with_session(|s| SqliteTermRepository::new(s).list_terms(other.document.id))
        .unwrap()
        .iter()
        .find(|term| term.kind == TermKind::Plain)
        .map(|term| term.id);
    assert!(adopted.parent_id.is_some());
    let err = manager
        .with_session(|s| SqliteTermRepository::new(s).insert_term(&adopted))
        .unwrap_err();
    assert!(matches!(err, StoreError::ReferentialIntegrity(_)));

    let mut unknown_document = plain_term(999, None);
    unknown_document.kind = TermKind::Root;
    let err = manager
        .with_session(|s| SqliteTermRepository::new(s).insert_term(&unknown_document))
        .unwrap_err();
    assert!(matches!(err, StoreError::ReferentialIntegrity(_)));

    assert_eq!(
        term_count(&manager),
        (terms.len() * 2) as i64,
        "rejected terms must not be stored"
    );
}

#[test]
fn term_properties_and_names_are_persisted() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let report = manager
        .import_document(&document_tree("props", "http://example.com/props.csv"))
        .unwrap();
    let terms = manager
        .with_session(|s| SqliteTermRepository::new(s).list_terms(report.document.id))
        .unwrap();

    let creator = terms
        .iter()
        .find(|term| term.qualified_name() == "root.creator")
        .unwrap();
    assert_eq!(creator.properties.get().get("role"), Some(&json!("author")));
    assert!(!creator.properties.is_dirty());

    let email = terms
        .iter()
        .find(|term| term.qualified_name() == "creator.email")
        .unwrap();
    assert_eq!(email.parent_id, Some(creator.id));
    assert_eq!(email.section_id, creator.section_id);

    let ids: Vec<i64> = terms.iter().map(|term| term.id).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
}

#[test]
fn saving_a_resource_writes_flags_and_dirty_schema() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let report = manager
        .import_document(&document_tree("save", "http://example.com/save.csv"))
        .unwrap();
    let mut resource = report.resources[0].clone();
    assert!(!resource.schema.is_dirty());

    resource.schema.push(ColumnSpec::new("age", "integer"));
    assert!(resource.schema.is_dirty());
    manager
        .with_session(|s| SqliteResourceRepository::new(s).save_resource(&mut resource))
        .unwrap();
    assert!(!resource.schema.is_dirty());

    let stored = manager.resource(&report.document, "people").unwrap();
    assert_eq!(stored.schema.len(), 3);
    assert_eq!(stored.schema[2], ColumnSpec::new("age", "integer"));
    assert_eq!(stored.table_name, format!("d{}_people", report.document.id));
}
