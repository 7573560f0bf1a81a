use metapack_core::{load_config, ConfigError, ManagerConfig};
use std::path::PathBuf;

#[test]
fn missing_file_is_an_io_error_naming_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = load_config(&path).unwrap_err();
    match err {
        ConfigError::Io { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn config_survives_toml_round_trip() {
    let config = ManagerConfig {
        database: Some(PathBuf::from("/var/lib/metapack/store.db")),
        nested_transactions: true,
        busy_timeout_ms: 1_000,
        log_level: Some("debug".to_string()),
        log_dir: Some("/var/log/metapack".to_string()),
    };
    let text = config.to_toml_string().unwrap();
    assert_eq!(ManagerConfig::from_toml_str(&text).unwrap(), config);
}

#[test]
fn unknown_keys_are_ignored() {
    let config = ManagerConfig::from_toml_str("database = \"a.db\"\ncolor = \"blue\"\n").unwrap();
    assert_eq!(config.database, Some(PathBuf::from("a.db")));
}
