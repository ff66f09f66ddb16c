use super::*;
use crate::middleware::{DuckDbHandle, DuckDbMiddleware};
use flok_core::{
    BoxError, Engine, MigrationContext, MigrationUnit, RunMethod, SourceRef, StaticSource,
    StatusError,
};
use std::sync::Arc;
use tempfile::TempDir;

fn applied(id: &str) -> MigrationStatus {
    let mut status = MigrationStatus::empty(id, id);
    status.run_method = Some(RunMethod::Up);
    status.signature = Some("sig".to_string());
    status
}

#[tokio::test]
async fn test_lock_roundtrip() {
    let db = DuckDbBackend::in_memory().unwrap();

    assert!(db.inspect().await.unwrap().is_none());
    let record = db.acquire().await.unwrap();
    assert_eq!(db.inspect().await.unwrap(), Some(record.clone()));

    let released = db.release().await.unwrap();
    assert_eq!(released, Some(record));
    assert!(db.inspect().await.unwrap().is_none());
}

#[tokio::test]
async fn test_lock_twice_is_already_locked() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.acquire().await.unwrap();

    match db.acquire().await {
        Err(CoreError::AlreadyLocked { holder }) => {
            assert!(holder.unwrap().contains(&std::process::id().to_string()))
        }
        other => panic!("expected AlreadyLocked, got {other:?}"),
    }
}

#[tokio::test]
async fn test_release_without_lock_is_tolerated() {
    let db = DuckDbBackend::in_memory().unwrap();
    assert_eq!(db.release().await.unwrap(), None);
}

#[tokio::test]
async fn test_stale_lock_replaced_with_lease() {
    let db = DuckDbBackend::in_memory()
        .unwrap()
        .with_lease(Some(Duration::from_secs(60)));

    let mut stale = LockRecord::current();
    stale.pid = 1;
    stale.date = stale.date - chrono::Duration::hours(3);
    assert!(db.insert_lock_sync(&stale).unwrap());

    let record = db.acquire().await.unwrap();
    assert_eq!(record.pid, std::process::id());
}

#[tokio::test]
async fn test_second_backend_on_same_file_sees_lock() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("flok.duckdb");

    let first = DuckDbBackend::from_path(&path).unwrap();
    let held = first.acquire().await.unwrap();

    // a second run opens the file while the first still holds the lock
    let second = DuckDbBackend::from_path(&path).unwrap();
    match second.acquire().await {
        Err(CoreError::AlreadyLocked { holder }) => assert_eq!(holder, Some(held.holder())),
        other => panic!("expected AlreadyLocked, got {other:?}"),
    }
    assert_eq!(second.inspect().await.unwrap(), Some(held.clone()));

    assert_eq!(first.release().await.unwrap(), Some(held));
    second.acquire().await.unwrap();
}

#[tokio::test]
async fn test_status_save_load_clear() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.save(&applied("a")).await.unwrap();
    db.save(&applied("b")).await.unwrap();

    let mut failed = applied("b");
    failed.error = Some(StatusError::new("ExecutionError", "boom").with_field("exitCode", 1));
    db.save(&failed).await.unwrap();

    let loaded = db.load_all().await.unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded["b"], failed);

    assert!(db.clear("a").await.unwrap());
    assert!(!db.clear("a").await.unwrap());
    assert_eq!(db.load_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("state").join("flok.duckdb");

    {
        let db = DuckDbBackend::from_path(&path).unwrap();
        db.save(&applied("a")).await.unwrap();
    }

    let db = DuckDbBackend::new(path.to_str().unwrap()).unwrap();
    assert_eq!(db.load_all().await.unwrap()["a"].run_method, Some(RunMethod::Up));
}

#[tokio::test]
async fn test_unreadable_record_is_persistence_error() {
    let db = DuckDbBackend::in_memory().unwrap();
    db.database()
        .with_conn(|conn| {
            Ok(conn.execute(
                "INSERT INTO flok_status (id, record) VALUES ('x', 'not json')",
                [],
            )?)
        })
        .unwrap();

    assert!(matches!(
        db.load_all().await,
        Err(CoreError::Persistence { .. })
    ));
}

struct CreateTable;

#[async_trait]
impl MigrationUnit for CreateTable {
    fn id(&self) -> &str {
        "create_users"
    }

    fn title(&self) -> &str {
        "Create users"
    }

    fn time(&self) -> i64 {
        1
    }

    fn source(&self) -> SourceRef {
        SourceRef::Inline("CREATE TABLE users (id INTEGER)".to_string())
    }

    fn has_down(&self) -> bool {
        true
    }

    async fn up(&self, ctx: &mut MigrationContext) -> Result<(), BoxError> {
        let handle = ctx
            .extension::<DuckDbHandle>()
            .ok_or("no database handle attached")?;
        handle.with(|conn| conn.execute_batch("CREATE TABLE users (id INTEGER)"))?;
        Ok(())
    }

    async fn down(&self, ctx: &mut MigrationContext) -> Result<(), BoxError> {
        let handle = ctx
            .extension::<DuckDbHandle>()
            .ok_or("no database handle attached")?;
        handle.with(|conn| conn.execute_batch("DROP TABLE users"))?;
        Ok(())
    }
}

#[tokio::test]
async fn test_engine_runs_against_duckdb() {
    let backend = Arc::new(DuckDbBackend::in_memory().unwrap());
    let engine = Engine::builder()
        .source(StaticSource::default().with(CreateTable))
        .lock_provider(backend.clone())
        .status_store(backend.clone())
        .middleware(Arc::new(DuckDbMiddleware::new(&backend)))
        .build()
        .unwrap();

    let report = engine.up().await.unwrap();
    assert_eq!(report.executed, vec!["create_users"]);

    let tables: i64 = backend
        .database()
        .with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = 'users'",
                [],
                |row| row.get(0),
            )?)
        })
        .unwrap();
    assert_eq!(tables, 1);
    assert!(backend.inspect().await.unwrap().is_none());

    let statuses = backend.load_all().await.unwrap();
    assert_eq!(statuses["create_users"].run_method, Some(RunMethod::Up));

    engine.down().await.unwrap();
    assert_eq!(
        backend.load_all().await.unwrap()["create_users"].run_method,
        Some(RunMethod::Down)
    );
}
