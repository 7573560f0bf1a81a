mod common;

use common::{document_tree, people_source};
use metapack_core::{
    load_config, DbError, DocumentKey, LoadOutcome, ManagerConfig, MetadataManager,
    ResourceSelection, StoreError, TableOutcome,
};

#[test]
fn load_imports_once_and_materializes_selected_resources() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let tree = document_tree("loaded", "http://example.com/loaded.csv");
    let source = people_source();

    let first = manager.load(&tree, ResourceSelection::All, &source).unwrap();
    assert!(first.imported);
    assert_eq!(first.resources.len(), 1);
    let (resource, outcome) = &first.resources[0];
    assert!(resource.table_created && resource.loaded);
    assert_eq!(outcome.table, TableOutcome::Created);
    assert_eq!(outcome.load, LoadOutcome::Loaded { rows: 3 });

    let second = manager
        .load(&tree, ResourceSelection::Named("people".to_string()), &source)
        .unwrap();
    assert!(!second.imported);
    assert_eq!(second.document.id, first.document.id);
    let (_, outcome) = &second.resources[0];
    assert_eq!(outcome.table, TableOutcome::AlreadyCreated);
    assert_eq!(outcome.load, LoadOutcome::AlreadyLoaded);
    assert_eq!(manager.documents().unwrap().len(), 1);
}

#[test]
fn load_without_selection_only_imports() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let tree = document_tree("metadata-only", "http://example.com/m.csv");
    let report = manager
        .load(&tree, ResourceSelection::None, &people_source())
        .unwrap();
    assert!(report.imported);
    assert!(report.resources.is_empty());

    let resource = manager.resource(&report.document, "people").unwrap();
    assert!(!resource.table_created);
    assert!(!manager.has_table(&resource.table_name).unwrap());
}

#[test]
fn load_of_unknown_resource_name_is_not_found() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let tree = document_tree("named", "http://example.com/named.csv");
    let err = manager
        .load(&tree, ResourceSelection::Named("missing".to_string()), &people_source())
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn flat_nested_failure_aborts_the_outer_scope() {
    let manager = MetadataManager::open_in_memory().unwrap();
    let tree = document_tree("flat", "http://example.com/flat.csv");

    let result = manager.with_session(|_| {
        manager.import_document(&tree)?;
        let duplicate = manager.import_document(&tree);
        assert!(matches!(
            duplicate,
            Err(StoreError::UniqueConstraintViolation(_))
        ));
        Ok(())
    });

    assert!(matches!(result, Err(StoreError::Db(DbError::ScopeAborted))));
    assert!(manager.documents().unwrap().is_empty());
    assert_eq!(manager.sessions().depth(), 0);
}

#[test]
fn savepoint_mode_keeps_outer_work_after_inner_failure() {
    let config = ManagerConfig::from_toml_str("nested_transactions = true").unwrap();
    let manager = MetadataManager::open(&config).unwrap();
    let tree = document_tree("isolated", "http://example.com/isolated.csv");

    manager
        .with_session(|_| {
            manager.import_document(&tree)?;
            assert!(manager.import_document(&tree).is_err());
            Ok(())
        })
        .unwrap();

    let documents = manager.documents().unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].name, "isolated");
}

#[test]
fn file_store_from_config_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("metadata.db");
    let config_path = dir.path().join("metapack.toml");
    std::fs::write(
        &config_path,
        format!(
            "database = {:?}\nbusy_timeout_ms = 250\n",
            database.to_str().unwrap()
        ),
    )
    .unwrap();

    let config = load_config(&config_path).unwrap();
    assert_eq!(config.database.as_deref(), Some(database.as_path()));
    assert_eq!(config.busy_timeout_ms, 250);

    {
        let manager = MetadataManager::open(&config).unwrap();
        manager
            .import_document(&document_tree("persisted", "http://example.com/p.csv"))
            .unwrap();
    }

    let reopened = MetadataManager::open(&config).unwrap();
    let stored = reopened
        .load_document(&DocumentKey::Name("persisted".to_string()))
        .unwrap();
    assert_eq!(stored.resources().len(), 1);
    assert_eq!(
        stored.tree().unwrap().find_value("root.title"),
        Some("Example document")
    );
}
