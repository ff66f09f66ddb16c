use super::*;
use crate::test_utils::TestUnit;
use tempfile::TempDir;

#[tokio::test]
async fn test_missing_directory() {
    let temp = TempDir::new().unwrap();
    let source = DirectorySource::new(temp.path().join("nope"));

    match source.load(&EngineLogger::discard()).await {
        Err(CoreError::MigrationsDirNotFound { path }) => assert!(path.ends_with("nope")),
        other => panic!("expected MigrationsDirNotFound, got {:?}", other.map(|u| u.len())),
    }
}

#[tokio::test]
async fn test_empty_directory() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("flok.yml"), "backend: file\n").unwrap();
    std::fs::write(temp.path().join("notes.txt"), "not a migration").unwrap();

    let result = DirectorySource::new(temp.path())
        .load(&EngineLogger::discard())
        .await;
    assert!(matches!(result, Err(CoreError::NoMigrations { .. })));
}

#[tokio::test]
async fn test_loads_yaml_definitions_only() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("b.yaml"), "time: 2\nup: echo b\n").unwrap();
    std::fs::write(temp.path().join("a.yml"), "time: 1\nup: echo a\n").unwrap();
    std::fs::write(temp.path().join("flok.yaml"), "backend: file\n").unwrap();
    std::fs::create_dir(temp.path().join("flokStatus")).unwrap();
    std::fs::write(temp.path().join("flokStatus").join("c.yml"), "time: 3\n").unwrap();

    let units = DirectorySource::new(temp.path())
        .load(&EngineLogger::discard())
        .await
        .unwrap();
    let ids: Vec<&str> = units.iter().map(|u| u.id()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn test_invalid_definition_fails_load() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("a.yml"), "up: echo a\n").unwrap();

    let result = DirectorySource::new(temp.path())
        .load(&EngineLogger::discard())
        .await;
    assert!(matches!(result, Err(CoreError::Validation { .. })));
}

#[tokio::test]
async fn test_static_source() {
    let source = StaticSource::default()
        .with(TestUnit::new("one", 1))
        .with(TestUnit::new("two", 2));

    let units = source.load(&EngineLogger::discard()).await.unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(source.describe(), "2 code-defined migrations");
}
