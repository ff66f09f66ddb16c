use super::*;
use tempfile::TempDir;

#[test]
fn test_parse_minimal_config() {
    let config: Config = serde_yaml::from_str("{}").unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.backend, Backend::File);
    assert_eq!(config.status_dir(), PathBuf::from("migrations/flokStatus"));
    assert_eq!(config.lock_file(), PathBuf::from("migrations/flok.lock"));
    assert!(config.lock_lease().is_none());
}

#[test]
fn test_parse_full_config() {
    let yaml = r#"
migrations_dir: db/migrations
status_dir: state
lock_file: run/flok.lock
lock_lease_secs: 900
backend: duckdb
database:
  path: ./warehouse.duckdb
"#;
    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.backend, Backend::Duckdb);
    assert_eq!(config.lock_lease(), Some(Duration::from_secs(900)));
    assert_eq!(config.status_dir(), PathBuf::from("state"));
    assert_eq!(config.database_path(), PathBuf::from("./warehouse.duckdb"));
}

#[test]
fn test_unknown_field_rejected() {
    let result: Result<Config, _> = serde_yaml::from_str("migration_dir: x\n");
    assert!(result.is_err());
}

#[test]
fn test_load_missing_file() {
    let temp = TempDir::new().unwrap();
    let result = Config::load(&temp.path().join("flok.yml"));
    assert!(matches!(result, Err(CoreError::ConfigNotFound { .. })));
}

#[test]
fn test_load_resolves_relative_paths() {
    let temp = TempDir::new().unwrap();
    std::fs::write(
        temp.path().join("flok.yml"),
        "migrations_dir: migrations\ndatabase:\n  path: \":memory:\"\n",
    )
    .unwrap();

    let config = Config::discover(temp.path()).unwrap();
    assert_eq!(config.migrations_dir, temp.path().join("migrations"));
    assert_eq!(
        config.lock_file(),
        temp.path().join("migrations").join("flok.lock")
    );
    assert_eq!(config.database_path(), PathBuf::from(":memory:"));
}

#[test]
fn test_discover_without_file_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let config = Config::discover(temp.path()).unwrap();
    assert_eq!(config.migrations_dir, temp.path().join("migrations"));
}

#[test]
fn test_zero_lease_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("flok.yml");
    std::fs::write(&path, "lock_lease_secs: 0\n").unwrap();

    assert!(matches!(
        Config::load(&path),
        Err(CoreError::ConfigInvalid { .. })
    ));
}

#[test]
fn test_backend_from_str() {
    assert_eq!("DuckDB".parse::<Backend>().unwrap(), Backend::Duckdb);
    assert!("postgres".parse::<Backend>().is_err());
}
