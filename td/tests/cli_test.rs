//! End-to-end tests for the `td` binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const TODO: &str = "## Work\n- [ ] Fix bug due: 2025-12-31 priority: high #urgent\n- [x] Done task\n";

/// `td` running inside `temp`, with logs and user config kept inside it too
fn td(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("td").expect("td binary should build");
    cmd.current_dir(temp.path())
        .env("HOME", temp.path())
        .env("XDG_DATA_HOME", temp.path().join("data"))
        .env("XDG_CONFIG_HOME", temp.path().join("config"))
        .env("NO_COLOR", "1")
        .env_remove("TODO_MAX_FILE_SIZE_MB")
        .env_remove("TODO_MAX_TASKS");
    cmd
}

fn workspace(todo: &str) -> TempDir {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("TODO.md"), todo).unwrap();
    temp
}

#[test]
fn test_parse_text() {
    let temp = workspace(TODO);
    td(&temp)
        .args(["parse", "TODO.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Work"))
        .stdout(predicate::str::contains("Fix bug"))
        .stdout(predicate::str::contains("#urgent"));
}

#[test]
fn test_parse_json() {
    let temp = workspace(TODO);
    let output = td(&temp).args(["parse", "TODO.md", "--format", "json"]).output().unwrap();
    assert!(output.status.success());

    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let tasks = doc["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0]["title"], "Fix bug");
    assert_eq!(tasks[1]["checked"], true);
}

#[test]
fn test_parse_rejects_path_outside_base() {
    let temp = workspace(TODO);
    td(&temp)
        .args(["parse", "../TODO.md"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("traversal").or(predicate::str::contains("outside")));
}

#[test]
fn test_validate() {
    let temp = workspace(TODO);
    td(&temp)
        .args(["validate", "TODO.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"));

    std::fs::write(temp.path().join("EMPTY.md"), "").unwrap();
    td(&temp)
        .args(["validate", "EMPTY.md"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Content is empty"));
}

#[test]
fn test_sync_once_round_trips_through_sqlite() {
    let temp = workspace(TODO);
    let config = temp.path().join("todosync.yml");
    std::fs::write(
        &config,
        format!(
            "sync:\n  todo-path: TODO.md\n  direction: bidirectional\nretry:\n  max-retries: 0\nstore:\n  path: {}\n",
            temp.path().join("tasks.db").display()
        ),
    )
    .unwrap();

    td(&temp)
        .arg("-c")
        .arg(&config)
        .args(["sync", "--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("History"))
        .stdout(predicate::str::contains("file_to_app"))
        .stdout(predicate::str::contains("app_to_file"));

    assert!(temp.path().join("tasks.db").exists());
    let content = std::fs::read_to_string(temp.path().join("TODO.md")).unwrap();
    assert!(content.starts_with("# TODO\n"));
    assert!(content.contains("## ⚡ High\n\n- [ ] Fix bug #urgent"));
    assert!(content.contains("- [x] Done task"));

    // Export from the same database reproduces the tasks
    std::fs::remove_file(temp.path().join("TODO.md")).unwrap();
    td(&temp).arg("-c").arg(&config).arg("export").assert().success();
    let exported = std::fs::read_to_string(temp.path().join("TODO.md")).unwrap();
    assert!(exported.contains("- [ ] Fix bug #urgent"));
}

#[test]
fn test_export_refused_for_file_to_app() {
    let temp = workspace(TODO);
    let config = temp.path().join("todosync.yml");
    std::fs::write(
        &config,
        format!(
            "sync:\n  direction: file_to_app\nstore:\n  path: {}\n",
            temp.path().join("tasks.db").display()
        ),
    )
    .unwrap();

    td(&temp)
        .arg("-c")
        .arg(&config)
        .arg("export")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not write the TODO file"));
}
