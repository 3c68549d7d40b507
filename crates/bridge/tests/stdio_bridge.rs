//! Drives real child processes: a small shell script that speaks just
//! enough of the tool-provider protocol.

#![cfg(unix)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tg_bridge::{BridgeError, BridgeSpec, BridgeStatus, StdioBridge};
use tg_domain::tool::CallContext;

const FAKE_PROVIDER: &str = r#"
echo "fake provider starting" >&2
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/^{"jsonrpc":"2.0","id":\([0-9]*\),.*/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      if [ -n "$INIT_LOG" ]; then echo init >> "$INIT_LOG"; fi
      echo "this line is not protocol"
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"fake","version":"0"}}}\n' "$id" ;;
    *'"method":"tools/list"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"echo","description":"Echo a message","inputSchema":{"type":"object"}},{"name":"env"},{"name":"fail"},{"name":"hang"},{"name":"crash"}]}}\n' "$id" ;;
    *'"name":"echo"'*)
      msg=$(printf '%s\n' "$line" | sed -n 's/.*"msg":"\([^"]*\)".*/\1/p')
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"%s"}]}}\n' "$id" "$msg" ;;
    *'"name":"env"'*)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"%s"}]}}\n' "$id" "$FAKE_GREETING" ;;
    *'"name":"fail"'*)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32602,"message":"bad arguments"}}\n' "$id" ;;
    *'"name":"hang"'*) ;;
    *'"name":"crash"'*) exit 3 ;;
  esac
done
"#;

fn write_provider(dir: &Path) -> String {
    let path = dir.join("provider.sh");
    std::fs::write(&path, FAKE_PROVIDER).unwrap();
    path.to_string_lossy().into_owned()
}

fn spec(dir: &Path, env: HashMap<String, String>) -> BridgeSpec {
    BridgeSpec {
        id: "fake".into(),
        command: "sh".into(),
        args: vec![write_provider(dir)],
        env,
        request_timeout: None,
        tool_prefix: None,
    }
}

async fn wait_for_in_flight(bridge: &StdioBridge, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while bridge.in_flight() < n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("requests should be in flight");
}

#[tokio::test]
async fn handshake_list_and_call() {
    let dir = tempfile::tempdir().unwrap();
    let env = HashMap::from([("FAKE_GREETING".to_string(), "hello from env".to_string())]);
    let bridge = StdioBridge::new(spec(dir.path(), env));
    assert_eq!(bridge.status(), BridgeStatus::NotStarted);

    bridge.start().await.unwrap();
    assert_eq!(bridge.status(), BridgeStatus::Ready);
    assert!(bridge.pid().is_some());

    let names: Vec<String> = bridge
        .list_tools()
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["echo", "env", "fail", "hang", "crash"]);

    let out = bridge.call_tool("echo", json!({ "msg": "hi" })).await.unwrap();
    assert_eq!(out["content"][0]["text"], "hi");

    let out = bridge.call_tool("env", json!({})).await.unwrap();
    assert_eq!(out["content"][0]["text"], "hello from env");

    let err = bridge.call_tool("fail", json!({})).await.unwrap_err();
    assert!(matches!(err, BridgeError::Remote(e) if e.code == -32602));

    bridge.shutdown().await;
    assert_eq!(bridge.status(), BridgeStatus::Failed);
    assert!(matches!(
        bridge.call_tool("echo", json!({ "msg": "x" })).await,
        Err(BridgeError::Unavailable(_))
    ));
}

#[tokio::test]
async fn concurrent_start_runs_one_handshake() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("init.log");
    let env = HashMap::from([("INIT_LOG".to_string(), log.to_string_lossy().into_owned())]);
    let bridge = Arc::new(StdioBridge::new(spec(dir.path(), env)));

    let starts: Vec<_> = (0..4)
        .map(|_| {
            let b = Arc::clone(&bridge);
            tokio::spawn(async move { b.start().await })
        })
        .collect();
    for s in starts {
        s.await.unwrap().unwrap();
    }
    bridge.start().await.unwrap();

    let inits = std::fs::read_to_string(&log).unwrap();
    assert_eq!(inits.lines().count(), 1);
    bridge.shutdown().await;
}

#[tokio::test]
async fn concurrent_calls_get_their_own_replies() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = Arc::new(StdioBridge::new(spec(dir.path(), HashMap::new())));

    let calls: Vec<_> = ["alpha", "beta", "gamma", "delta"]
        .into_iter()
        .map(|msg| {
            let b = Arc::clone(&bridge);
            tokio::spawn(async move { (msg, b.call_tool("echo", json!({ "msg": msg })).await) })
        })
        .collect();
    for c in calls {
        let (msg, out) = c.await.unwrap();
        assert_eq!(out.unwrap()["content"][0]["text"], msg);
    }
    bridge.shutdown().await;
}

#[tokio::test]
async fn child_exit_fails_in_flight_calls() {
    let dir = tempfile::tempdir().unwrap();
    let bridge = Arc::new(StdioBridge::new(spec(dir.path(), HashMap::new())));
    bridge.start().await.unwrap();

    let hung: Vec<_> = (0..3)
        .map(|_| {
            let b = Arc::clone(&bridge);
            tokio::spawn(async move { b.call_tool("hang", json!({})).await })
        })
        .collect();
    wait_for_in_flight(&bridge, 3).await;

    let crash = bridge.call_tool("crash", json!({})).await;
    assert!(matches!(crash, Err(BridgeError::Unavailable(_))));

    for h in hung {
        let res = tokio::time::timeout(Duration::from_secs(5), h)
            .await
            .expect("waiter released")
            .unwrap();
        assert!(matches!(res, Err(BridgeError::Unavailable(_))));
    }
    assert_eq!(bridge.status(), BridgeStatus::Failed);
    assert_eq!(bridge.in_flight(), 0);
    assert!(bridge.start().await.is_err());
}

#[tokio::test]
async fn request_timeout_leaves_bridge_usable() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = spec(dir.path(), HashMap::new());
    s.request_timeout = Some(Duration::from_millis(500));
    let bridge = StdioBridge::new(s);

    let err = bridge.call_tool("hang", json!({})).await.unwrap_err();
    assert!(matches!(err, BridgeError::Timeout(500)));
    assert_eq!(bridge.in_flight(), 0);
    assert_eq!(bridge.status(), BridgeStatus::Ready);

    let out = bridge.call_tool("echo", json!({ "msg": "still here" })).await.unwrap();
    assert_eq!(out["content"][0]["text"], "still here");
    bridge.shutdown().await;
}

#[tokio::test]
async fn spawn_failure_is_sticky() {
    let bridge = StdioBridge::new(BridgeSpec {
        id: "missing".into(),
        command: "/nonexistent/tool-provider".into(),
        args: vec![],
        env: HashMap::new(),
        request_timeout: None,
        tool_prefix: None,
    });
    assert!(matches!(bridge.start().await, Err(BridgeError::Spawn(_))));
    assert_eq!(bridge.status(), BridgeStatus::Failed);
    assert!(matches!(bridge.start().await, Err(BridgeError::Unavailable(_))));
}

#[tokio::test]
async fn tool_set_applies_prefix_and_forwards() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = spec(dir.path(), HashMap::new());
    s.tool_prefix = Some("fake.".into());
    let bridge = Arc::new(StdioBridge::new(s));

    let entries = bridge.tool_set().await.unwrap();
    let echo = entries
        .iter()
        .find(|e| e.name() == "fake.echo")
        .expect("prefixed echo tool");
    assert_eq!(echo.definition.description, "Echo a message");

    let ctx = CallContext {
        session_id: "s1".into(),
        tool_name: "fake.echo".into(),
    };
    let out = echo.handler.call(ctx, json!({ "msg": "via table" })).await.unwrap();
    assert_eq!(out["content"][0]["text"], "via table");
    bridge.shutdown().await;
}
