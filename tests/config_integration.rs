//! Configuration file handling

use std::io::Write;

use kuba_compose::{Config, Error};

#[test]
fn test_save_and_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compose.toml");

    let mut config = Config::default();
    config.engine.max_concurrent_queries = 3;
    config.engine.default_step_secs = 30;
    config.logging.json = true;
    config.save_to_file(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded.engine.max_concurrent_queries, 3);
    assert_eq!(loaded.engine.default_step_secs, 30);
    assert!(loaded.logging.json);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_empty_file_is_default() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.engine.query_timeout_ms, 30_000);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_malformed_file_is_configuration_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[engine]\nmax_concurrent_queries = \"many\"").unwrap();

    let err = Config::from_file(file.path()).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(err.api_error_type().as_str(), "internal");
}

#[test]
fn test_missing_file_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Config::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}
