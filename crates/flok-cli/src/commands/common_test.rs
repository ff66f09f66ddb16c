use super::*;

#[test]
fn test_column_widths() {
    let rows = vec![
        vec!["20240101_users".to_string(), "done".to_string()],
        vec!["b".to_string(), "pending".to_string()],
    ];
    assert_eq!(calculate_column_widths(&["ID", "STATE"], &rows), vec![14, 7]);
}

#[test]
fn test_render_table_aligns_columns() {
    let rows = vec![
        vec!["a".to_string(), "done".to_string()],
        vec!["longer".to_string(), "pending".to_string()],
    ];
    let lines = render_table(&["ID", "STATE"], &rows);
    assert_eq!(
        lines,
        vec![
            "ID      STATE",
            "------  -------",
            "a       done",
            "longer  pending",
        ]
    );
}

#[test]
fn test_failure_line() {
    assert_eq!(
        failure_line("up", &"[L001] lock already exists"),
        "ERROR migrating up: [L001] lock already exists"
    );
}

#[test]
fn test_exit_code_displays_nothing() {
    assert_eq!(ExitCode(1).to_string(), "");
}
