//! A session's sticky project root driving the CLI tools end to end.

#![cfg(unix)]

use std::sync::Arc;

use serde_json::{json, Value};
use tg_domain::config::CliTimeouts;
use tg_domain::tool::{CallContext, ToolTable};
use tg_sessions::{PathResolver, WorkdirStore};
use tg_tools::{CliToolSet, CommandAdapter};

/// Prints the subcommand it was called with, creates the marker on `init`.
const FAKE_CLI: &str = r#"
case "$1" in
  init) mkdir -p .taskmaster; echo "initialized $(pwd)" ;;
  list) echo "1 [pending] Write the docs" ;;
  *) echo "unexpected: $*" >&2; exit 2 ;;
esac
"#;

fn text(result: &Value) -> &str {
    result["content"][0]["text"].as_str().unwrap()
}

async fn call(table: &ToolTable, session: &str, tool: &str, args: Value) -> Value {
    let ctx = CallContext {
        session_id: session.into(),
        tool_name: tool.into(),
    };
    table.call(ctx, args).await.expect("CLI tools never return Err")
}

#[tokio::test]
async fn list_requires_init_then_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fake-cli.sh");
    std::fs::write(&script, FAKE_CLI).unwrap();
    let project = dir.path().join("app");
    std::fs::create_dir_all(&project).unwrap();
    let project = project.to_string_lossy().into_owned();

    let workdirs = Arc::new(WorkdirStore::new(PathResolver::new("", "/workspace"), "/workspace"));
    let adapter = Arc::new(CommandAdapter::new(
        format!("sh {}", script.display()),
        ".taskmaster",
        CliTimeouts::default(),
    ));
    let mut table = ToolTable::new();
    table.extend(CliToolSet::new(adapter, Arc::clone(&workdirs)).entries());

    let before = call(&table, "S1", "list-tasks", json!({ "projectRoot": project })).await;
    assert_eq!(before["isError"], true);
    assert!(text(&before).contains("not initialized"));
    assert!(!std::path::Path::new(&project).join(".taskmaster").exists());

    // The project root is sticky: later calls omit it.
    let init = call(&table, "S1", "init-project", json!({})).await;
    assert!(init.get("isError").is_none(), "init failed: {init}");
    assert!(text(&init).starts_with("initialized"));

    let after = call(&table, "S1", "list-tasks", json!({})).await;
    assert!(after.get("isError").is_none());
    assert_eq!(text(&after).trim(), "1 [pending] Write the docs");

    // Another session starts from the default directory.
    assert_eq!(workdirs.get("S2"), None);
    assert_eq!(workdirs.get("S1").as_deref(), Some(project.as_str()));
}

#[tokio::test]
async fn cli_failure_is_a_structured_result() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fake-cli.sh");
    std::fs::write(&script, FAKE_CLI).unwrap();
    std::fs::create_dir_all(dir.path().join(".taskmaster")).unwrap();

    let workdirs = Arc::new(WorkdirStore::new(
        PathResolver::new("", "/workspace"),
        dir.path().to_string_lossy(),
    ));
    let adapter = Arc::new(CommandAdapter::new(
        format!("sh {}", script.display()),
        ".taskmaster",
        CliTimeouts::default(),
    ));
    let mut table = ToolTable::new();
    table.extend(CliToolSet::new(adapter, workdirs).entries());

    let out = call(&table, "S1", "next-task", json!({})).await;
    assert_eq!(out["isError"], true);
    let body: Value = serde_json::from_str(text(&out)).unwrap();
    assert!(body["error"].as_str().unwrap().contains("status 2"));

    let out = call(&table, "S1", "show-task", json!({})).await;
    assert!(text(&out).contains("missing required argument"));
}
