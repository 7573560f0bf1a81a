mod common;

use common::{document_tree, people_columns, people_source, unique_identifier, PEOPLE_URL};
use metapack_core::db::catalog::table_columns;
use metapack_core::source::row;
use metapack_core::{
    ColumnSpec, DocTree, DocumentKey, LoadOutcome, MemoryRowSource, MetadataManager, Resource,
    RowSourceError, StoreError, TableOutcome,
};
use serde_json::json;

fn imported(manager: &MetadataManager, name: &str) -> Resource {
    let report = manager
        .import_document(&document_tree(name, &format!("http://example.com/{name}.csv")))
        .unwrap();
    report.resources.into_iter().next().unwrap()
}

fn datafiles_tree(datafiles: &[(&str, Vec<ColumnSpec>)]) -> DocTree {
    let mut tree = DocTree::new();
    let root = tree.root();
    tree.add_term(root, "Identifier", Some(unique_identifier().as_str()))
        .unwrap();
    tree.add_term(root, "Name", Some("datafiles")).unwrap();
    let resources = tree.add_section("Resources").unwrap();
    for (name, columns) in datafiles {
        tree.add_datafile(resources, name, PEOPLE_URL, columns.clone())
            .unwrap();
    }
    tree
}

fn assert_nothing_stored(manager: &MetadataManager) {
    assert!(manager.documents().unwrap().is_empty());
    assert_eq!(
        manager.list_tables().unwrap(),
        vec!["mt_documents", "mt_resources", "mt_terms"]
    );
}

fn row_count(manager: &MetadataManager, table: &str) -> i64 {
    manager
        .with_session(|s| {
            Ok(s.conn().query_row(
                &format!("SELECT COUNT(*) FROM \"{table}\";"),
                [],
                |row| row.get(0),
            )?)
        })
        .unwrap()
}

#[test]
fn make_table_creates_once() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let mut resource = imported(&manager, "tables");

    assert_eq!(manager.make_table(&mut resource).unwrap(), TableOutcome::Created);
    assert!(resource.table_created);
    assert_eq!(
        manager.make_table(&mut resource).unwrap(),
        TableOutcome::AlreadyCreated
    );
    assert!(manager.has_table(&resource.table_name).unwrap());

    let columns = manager
        .with_session(|s| Ok(table_columns(s.conn(), &resource.table_name)?))
        .unwrap();
    let layout: Vec<(String, String)> = columns
        .into_iter()
        .map(|column| (column.name, column.declared_type))
        .collect();
    assert_eq!(
        layout,
        vec![
            ("_id".to_string(), "INTEGER".to_string()),
            ("id".to_string(), "INTEGER".to_string()),
            ("name".to_string(), "TEXT".to_string()),
        ]
    );
}

#[test]
fn load_resource_loads_once_and_persists_flags() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let mut resource = imported(&manager, "loads");
    let source = people_source();

    manager.make_table(&mut resource).unwrap();
    assert_eq!(
        manager.load_resource(&mut resource, &source).unwrap(),
        LoadOutcome::Loaded { rows: 3 }
    );
    assert_eq!(
        manager.load_resource(&mut resource, &source).unwrap(),
        LoadOutcome::AlreadyLoaded
    );
    assert_eq!(row_count(&manager, &resource.table_name), 3);

    let document = manager
        .require_document(&DocumentKey::Name("loads".to_string()))
        .unwrap();
    let stored = manager.resource(&document, "people").unwrap();
    assert!(stored.table_created);
    assert!(stored.loaded);
}

#[test]
fn loading_before_the_table_exists_is_invalid_state() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let mut resource = imported(&manager, "early");

    let err = manager
        .load_resource(&mut resource, &people_source())
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidState(_)));
    assert!(!resource.loaded);
}

#[test]
fn failed_source_leaves_flag_false_and_table_empty() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let mut resource = imported(&manager, "broken");
    manager.make_table(&mut resource).unwrap();

    let err = manager
        .load_resource(&mut resource, &MemoryRowSource::new())
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::RowSource(RowSourceError::UnknownUrl(url)) if url == PEOPLE_URL
    ));
    assert!(!resource.loaded);
    assert_eq!(row_count(&manager, &resource.table_name), 0);

    // Retrying with a working source succeeds.
    assert_eq!(
        manager.load_resource(&mut resource, &people_source()).unwrap(),
        LoadOutcome::Loaded { rows: 3 }
    );
}

#[test]
fn missing_columns_become_null_and_extra_keys_are_ignored() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let mut resource = imported(&manager, "sparse");
    let source = MemoryRowSource::new().with_rows(
        PEOPLE_URL,
        vec![row([("id", json!(7)), ("unexpected", json!(true))])],
    );

    let outcome = manager.materialize(&mut resource, &source).unwrap();
    assert_eq!(outcome.table, TableOutcome::Created);
    assert_eq!(outcome.load, LoadOutcome::Loaded { rows: 1 });

    let (id, name): (i64, Option<String>) = manager
        .with_session(|s| {
            Ok(s.conn().query_row(
                &format!("SELECT id, name FROM \"{}\";", resource.table_name),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?)
        })
        .unwrap();
    assert_eq!(id, 7);
    assert_eq!(name, None);
}

#[test]
fn deleting_a_document_drops_its_data_tables() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let mut resource = imported(&manager, "dropped");
    manager
        .materialize(&mut resource, &people_source())
        .unwrap();
    assert!(manager.has_table(&resource.table_name).unwrap());

    manager
        .delete_document(&DocumentKey::Id(resource.document_id))
        .unwrap();
    assert!(!manager.has_table(&resource.table_name).unwrap());
    assert_eq!(
        manager.list_tables().unwrap(),
        vec!["mt_documents", "mt_resources", "mt_terms"]
    );
}

#[test]
fn replacing_a_document_reimports_and_drops_old_tables() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let tree = document_tree("replaced", "http://example.com/replaced.csv");
    let first = manager.import_document(&tree).unwrap();
    let mut resource = first.resources[0].clone();
    manager
        .materialize(&mut resource, &people_source())
        .unwrap();

    let second = manager.replace_document(&tree).unwrap();
    assert_ne!(second.document.id, first.document.id);
    assert_eq!(second.document.identifier, first.document.identifier);
    assert!(!manager.has_table(&resource.table_name).unwrap());
    assert!(!second.resources[0].table_created);
    assert_eq!(manager.documents().unwrap().len(), 1);
}

#[test]
fn datafiles_slugifying_to_one_table_are_rejected_at_import() {
    let manager = MetadataManager::open_in_memory().unwrap();

    for (first, second) in [("People", "people"), ("a b", "a-b")] {
        let tree = datafiles_tree(&[
            (first, people_columns()),
            (second, people_columns()),
        ]);
        let err = manager.import_document(&tree).unwrap_err();
        assert!(
            matches!(err, StoreError::UniqueConstraintViolation(_)),
            "unexpected error: {err}"
        );
        assert_nothing_stored(&manager);
    }

    let tree = datafiles_tree(&[
        ("people", people_columns()),
        ("places", people_columns()),
    ]);
    let report = manager.import_document(&tree).unwrap();
    let mut names = Vec::new();
    for mut resource in report.resources {
        assert_eq!(
            manager.make_table(&mut resource).unwrap(),
            TableOutcome::Created
        );
        names.push(resource.table_name);
    }
    assert_ne!(names[0], names[1]);
}

#[test]
fn clashing_column_headers_are_rejected_at_import() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let schemas = [
        vec![
            ColumnSpec::new("_id", "integer"),
            ColumnSpec::new("name", "string"),
        ],
        vec![
            ColumnSpec::new("ID", "integer"),
            ColumnSpec::new("id", "integer"),
        ],
    ];

    for columns in schemas {
        let err = manager
            .import_document(&datafiles_tree(&[("people", columns)]))
            .unwrap_err();
        assert!(
            matches!(
                err,
                StoreError::InvalidData(ref message) if message.contains("people")
            ),
            "unexpected error: {err}"
        );
        assert_nothing_stored(&manager);
    }
}
