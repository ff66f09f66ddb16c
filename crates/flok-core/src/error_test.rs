use super::*;

#[test]
fn test_already_locked_message() {
    let err = CoreError::AlreadyLocked {
        holder: Some("host ci-1 pid 42".to_string()),
    };
    assert_eq!(
        err.to_string(),
        "[L001] lock already exists (held by host ci-1 pid 42)"
    );
    assert_eq!(
        CoreError::AlreadyLocked { holder: None }.to_string(),
        "[L001] lock already exists"
    );
}

#[test]
fn test_changed_lists_ids() {
    let err = CoreError::ChangedMigrations {
        ids: vec!["a".to_string(), "b".to_string()],
    };
    assert_eq!(err.to_string(), "[M001] found changed migrations: a, b");
    assert_eq!(err.name(), "ChangedMigrationError");
}

#[test]
fn test_execution_message_uses_status_error() {
    let err = CoreError::Execution {
        id: "m1".to_string(),
        title: "Create users".to_string(),
        method: RunMethod::Up,
        error: StatusError::new("ExecutionError", "table exists"),
    };
    assert_eq!(
        err.to_string(),
        "[M003] error executing up on [Create users]: table exists"
    );
}

#[test]
fn test_status_not_recorded_mentions_dump() {
    let err = CoreError::StatusNotRecorded {
        id: "m1".to_string(),
        message: "disk full".to_string(),
        dump_path: Some(PathBuf::from("/tmp/flok_status_dump_x.json")),
        execution: None,
    };
    let msg = err.to_string();
    assert!(msg.contains("manual status reconciliation required"));
    assert!(msg.contains("/tmp/flok_status_dump_x.json"));
    assert_eq!(err.name(), "PersistenceError");
}

#[test]
fn test_kind_names() {
    assert_eq!(CoreError::NotLocked.name(), "NotLocked");
    assert_eq!(CoreError::validation("m", "bad").name(), "ValidationError");
    assert_eq!(
        CoreError::Cycle {
            cycle: "a -> b -> a".to_string()
        }
        .name(),
        "CycleError"
    );
    assert_eq!(CoreError::persistence("x").name(), "PersistenceError");
}
