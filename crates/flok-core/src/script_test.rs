use super::*;
use crate::logger::EngineLogger;
use crate::status::RunMethod;
use std::sync::Mutex;
use tempfile::TempDir;

fn write_definition(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn context(id: &str, method: RunMethod) -> MigrationContext {
    MigrationContext::new(id, id, method, EngineLogger::discard())
}

#[test]
fn test_parse_minimal_definition() {
    let m = ScriptMigration::parse(
        Path::new("migrations/20240101_users.yml"),
        "time: 5\nup: echo hi\n",
    )
    .unwrap();

    assert_eq!(m.id(), "20240101_users");
    assert_eq!(m.title(), "20240101_users");
    assert_eq!(m.time(), 5);
    assert!(m.has_up());
    assert!(!m.has_down());
    assert_eq!(
        m.up_operation(),
        Some(&Operation::Shell {
            command: "echo hi".to_string(),
            env: BTreeMap::new()
        })
    );
}

#[test]
fn test_parse_full_definition() {
    let yaml = r#"
id: users
title: Create users
time: "2024-01-01T00:00:00Z"
dependencies: [init]
up:
  shell: ./create.sh
  env:
    TABLE: users
down:
  sql: DROP TABLE users
"#;
    let m = ScriptMigration::parse(Path::new("x.yml"), yaml).unwrap();

    assert_eq!(m.id(), "users");
    assert_eq!(m.title(), "Create users");
    assert_eq!(m.time(), 1_704_067_200_000);
    assert_eq!(m.dependencies(), ["init".to_string()]);
    assert_eq!(
        m.down_operation(),
        Some(&Operation::Sql("DROP TABLE users".to_string()))
    );
    match m.up_operation() {
        Some(Operation::Shell { env, .. }) => assert_eq!(env["TABLE"], "users"),
        other => panic!("expected shell, got {other:?}"),
    }
}

#[test]
fn test_parse_rejects_both_shell_and_sql() {
    let yaml = "time: 1\nup:\n  shell: echo\n  sql: SELECT 1\n";
    let err = ScriptMigration::parse(Path::new("x.yml"), yaml).unwrap_err();
    assert!(matches!(err, CoreError::Validation { .. }));
}

#[test]
fn test_parse_rejects_unknown_fields() {
    let yaml = "time: 1\nup: echo\nretries: 3\n";
    assert!(ScriptMigration::parse(Path::new("x.yml"), yaml).is_err());
}

#[test]
fn test_parse_rejects_bad_time() {
    let yaml = "time: yesterday\nup: echo\n";
    match ScriptMigration::parse(Path::new("x.yml"), yaml) {
        Err(CoreError::Validation { reason, .. }) => assert!(reason.contains("yesterday")),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_shell_operation_gets_environment() {
    let temp = TempDir::new().unwrap();
    let path = write_definition(
        temp.path(),
        "m1.yml",
        "time: 1\nup: echo \"$FLOK_MIGRATION_ID:$FLOK_RUN_METHOD:$EXTRA\" > out.txt\n",
    );
    let m = ScriptMigration::load(&path).unwrap();

    let mut ctx = context("m1", RunMethod::Up);
    let mut extra = ScriptEnv::default();
    extra.set("EXTRA", "yes");
    ctx.extensions_mut().insert(extra);

    m.up(&mut ctx).await.unwrap();
    let out = std::fs::read_to_string(temp.path().join("out.txt")).unwrap();
    assert_eq!(out.trim(), "m1:up:yes");
}

#[cfg(unix)]
#[tokio::test]
async fn test_failing_shell_records_exit_code() {
    let temp = TempDir::new().unwrap();
    let path = write_definition(
        temp.path(),
        "bad.yml",
        "time: 1\nup: echo broken >&2; exit 3\n",
    );
    let m = ScriptMigration::load(&path).unwrap();

    let err = m.up(&mut context("bad", RunMethod::Up)).await.unwrap_err();
    let status = StatusError::from_error(err.as_ref());
    assert_eq!(status.name, "ExecutionError");
    assert!(status.message.contains("exited with code 3"));
    assert!(status.message.ends_with("broken"));
    assert_eq!(status.fields["exitCode"], 3);
}

#[tokio::test]
async fn test_missing_down_fails() {
    let m = ScriptMigration::parse(Path::new("m.yml"), "time: 1\nup: echo\n").unwrap();
    let err = m.down(&mut context("m", RunMethod::Down)).await.unwrap_err();
    assert!(err.to_string().contains("no down operation"));
}

#[tokio::test]
async fn test_sql_without_connection_fails() {
    let m = ScriptMigration::parse(Path::new("m.yml"), "time: 1\nup:\n  sql: SELECT 1\n").unwrap();
    let err = m.up(&mut context("m", RunMethod::Up)).await.unwrap_err();
    assert!(err.to_string().contains("database connection"));
}

#[derive(Default)]
struct RecordingExecutor {
    statements: Mutex<Vec<String>>,
}

#[async_trait]
impl SqlExecutor for RecordingExecutor {
    async fn execute_batch(&self, sql: &str) -> Result<(), BoxError> {
        self.statements.lock().unwrap().push(sql.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_sql_runs_through_connection_extension() {
    let m = ScriptMigration::parse(
        Path::new("m.yml"),
        "time: 1\nup:\n  sql: CREATE TABLE t (x INT)\n",
    )
    .unwrap();
    let executor = Arc::new(RecordingExecutor::default());

    let mut ctx = context("m", RunMethod::Up);
    ctx.extensions_mut().insert(SqlConnection(executor.clone()));
    m.up(&mut ctx).await.unwrap();

    assert_eq!(
        *executor.statements.lock().unwrap(),
        vec!["CREATE TABLE t (x INT)".to_string()]
    );
}
