//! A child tool provider reached over stdio.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use tg_domain::config::BridgeConfig;
use tg_domain::tool::ToolDefinition;
use tg_domain::trace::TraceEvent;

use crate::error::BridgeError;
use crate::protocol::{self, ToolsListResult};
use crate::transport::Connection;

/// Grace period between closing the child's stdin and killing it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Handshake limit used when the bridge has no request timeout of its own.
const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on `tools/list` pages, in case a provider keeps handing out
/// cursors.
const MAX_LIST_PAGES: usize = 64;

/// Everything needed to launch one child.
#[derive(Debug, Clone)]
pub struct BridgeSpec {
    pub id: String,
    pub command: String,
    pub args: Vec<String>,
    /// Merged over the gateway's own environment.
    pub env: HashMap<String, String>,
    pub request_timeout: Option<Duration>,
    pub tool_prefix: Option<String>,
}

impl From<&BridgeConfig> for BridgeSpec {
    fn from(cfg: &BridgeConfig) -> Self {
        Self {
            id: cfg.id.clone(),
            command: cfg.command.clone(),
            args: cfg.args.clone(),
            env: cfg.env.clone(),
            request_timeout: cfg.request_timeout_ms.map(Duration::from_millis),
            tool_prefix: cfg.tool_prefix.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    NotStarted,
    Starting,
    Ready,
    Failed,
}

struct Running {
    conn: Arc<Connection>,
    pid: Option<u32>,
    stop_tx: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<()>,
}

enum Lifecycle {
    NotStarted,
    Starting,
    Ready(Running),
    Failed(String),
}

pub struct StdioBridge {
    spec: BridgeSpec,
    state: RwLock<Lifecycle>,
    /// Held for the whole spawn + handshake so only one caller starts the
    /// child.
    start_lock: Mutex<()>,
    tools: RwLock<Option<Vec<ToolDefinition>>>,
}

impl StdioBridge {
    pub fn new(spec: BridgeSpec) -> Self {
        Self {
            spec,
            state: RwLock::new(Lifecycle::NotStarted),
            start_lock: Mutex::new(()),
            tools: RwLock::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn spec(&self) -> &BridgeSpec {
        &self.spec
    }

    pub fn status(&self) -> BridgeStatus {
        match &*self.state.read() {
            Lifecycle::NotStarted => BridgeStatus::NotStarted,
            Lifecycle::Starting => BridgeStatus::Starting,
            Lifecycle::Ready(r) if r.conn.is_alive() => BridgeStatus::Ready,
            Lifecycle::Ready(_) | Lifecycle::Failed(_) => BridgeStatus::Failed,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        match &*self.state.read() {
            Lifecycle::Ready(r) => r.pid,
            _ => None,
        }
    }

    /// Requests currently waiting on the child.
    pub fn in_flight(&self) -> usize {
        match &*self.state.read() {
            Lifecycle::Ready(r) => r.conn.in_flight(),
            _ => 0,
        }
    }

    /// Spawn the child and run the handshake, once.
    ///
    /// Concurrent callers wait for the first one; later callers see the
    /// outcome. A failed bridge is never restarted.
    pub async fn start(&self) -> Result<(), BridgeError> {
        if let Some(result) = self.settled() {
            return result;
        }
        let _guard = self.start_lock.lock().await;
        if let Some(result) = self.settled() {
            return result;
        }

        *self.state.write() = Lifecycle::Starting;
        match self.launch().await {
            Ok(running) => {
                tracing::info!(bridge = %self.spec.id, pid = ?running.pid, "bridge ready");
                TraceEvent::BridgeStarted {
                    bridge_id: self.spec.id.clone(),
                    pid: running.pid,
                }
                .emit();
                *self.state.write() = Lifecycle::Ready(running);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(bridge = %self.spec.id, error = %e, "bridge failed to start");
                *self.state.write() = Lifecycle::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// `Some` once startup has a final answer (ready or failed).
    fn settled(&self) -> Option<Result<(), BridgeError>> {
        match &*self.state.read() {
            Lifecycle::Ready(r) if r.conn.is_alive() => Some(Ok(())),
            Lifecycle::Ready(_) => Some(Err(BridgeError::Unavailable(format!(
                "bridge {} has exited",
                self.spec.id
            )))),
            Lifecycle::Failed(reason) => Some(Err(BridgeError::Unavailable(reason.clone()))),
            Lifecycle::NotStarted | Lifecycle::Starting => None,
        }
    }

    async fn launch(&self) -> Result<Running, BridgeError> {
        let mut cmd = tokio::process::Command::new(&self.spec.command);
        cmd.args(&self.spec.args)
            .envs(&self.spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| BridgeError::Spawn(format!("{}: {e}", self.spec.command)))?;
        let pid = child.id();

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Spawn("failed to capture child stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Spawn("failed to capture child stdout".into()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(self.spec.id.clone(), stderr));
        }

        let (conn, _reader) =
            Connection::open(self.spec.id.clone(), stdout, stdin, self.spec.request_timeout);
        let (stop_tx, stop_rx) = oneshot::channel();
        let monitor = tokio::spawn(monitor_child(child, stop_rx, Arc::clone(&conn)));

        let running = Running {
            conn,
            pid,
            stop_tx: Some(stop_tx),
            monitor,
        };

        if let Err(e) = self.handshake(&running.conn).await {
            stop(running).await;
            return Err(e);
        }
        Ok(running)
    }

    async fn handshake(&self, conn: &Connection) -> Result<(), BridgeError> {
        let params = serde_json::to_value(protocol::initialize_params())?;
        let limit = self.spec.request_timeout.unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT);
        let info = conn
            .request_with_timeout("initialize", Some(params), Some(limit))
            .await
            .map_err(|e| BridgeError::Handshake(e.to_string()))?;
        tracing::debug!(
            bridge = %self.spec.id,
            server = ?info.get("serverInfo"),
            "initialize acknowledged"
        );
        conn.notify("notifications/initialized", None)
            .await
            .map_err(|e| BridgeError::Handshake(e.to_string()))
    }

    async fn connection(&self) -> Result<Arc<Connection>, BridgeError> {
        self.start().await?;
        match &*self.state.read() {
            Lifecycle::Ready(r) if r.conn.is_alive() => Ok(Arc::clone(&r.conn)),
            Lifecycle::Failed(reason) => Err(BridgeError::Unavailable(reason.clone())),
            _ => Err(BridgeError::Unavailable(format!(
                "bridge {} is not running",
                self.spec.id
            ))),
        }
    }

    /// Send an arbitrary request, starting the child if needed.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, BridgeError> {
        self.connection().await?.request(method, params).await
    }

    /// Tools the child declares, fetched once and then cached.
    ///
    /// Names are returned as the child reports them, without the prefix.
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>, BridgeError> {
        let conn = self.connection().await?;
        if let Some(cached) = self.tools.read().clone() {
            return Ok(cached);
        }

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = cursor
                .as_ref()
                .map(|c| serde_json::json!({ "cursor": c }));
            let page: ToolsListResult =
                serde_json::from_value(conn.request("tools/list", params).await?)?;
            tools.extend(page.tools.into_iter().map(|t| t.into_definition()));
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        tracing::info!(bridge = %self.spec.id, tool_count = tools.len(), "bridge tools discovered");
        *self.tools.write() = Some(tools.clone());
        Ok(tools)
    }

    /// Invoke one of the child's tools by its own (unprefixed) name.
    ///
    /// A JSON-RPC error reply surfaces as [`BridgeError::Remote`]; any result
    /// payload, including one flagged `isError`, is returned untouched.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, BridgeError> {
        let params = serde_json::json!({ "name": name, "arguments": arguments });
        self.request("tools/call", Some(params)).await
    }

    /// Close the child's stdin, give it a grace period, then kill it.
    ///
    /// The bridge stays failed afterwards. Calling this twice is harmless.
    pub async fn shutdown(&self) {
        let _guard = self.start_lock.lock().await;
        let previous = std::mem::replace(
            &mut *self.state.write(),
            Lifecycle::Failed(format!("bridge {} shut down", self.spec.id)),
        );
        self.tools.write().take();
        if let Lifecycle::Ready(running) = previous {
            stop(running).await;
            tracing::info!(bridge = %self.spec.id, "bridge stopped");
            TraceEvent::BridgeStopped {
                bridge_id: self.spec.id.clone(),
            }
            .emit();
        }
    }
}

impl std::fmt::Debug for StdioBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioBridge")
            .field("id", &self.spec.id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

async fn stop(mut running: Running) {
    running.conn.close_input().await;
    if let Some(tx) = running.stop_tx.take() {
        let _ = tx.send(());
    }
    if let Err(e) = running.monitor.await {
        tracing::warn!(error = %e, "bridge monitor task panicked");
    }
    running.conn.fail("bridge shut down");
}

/// Wait for the child to exit on its own or for a stop request, then fail
/// the connection so nothing keeps waiting on a dead process.
async fn monitor_child(mut child: Child, mut stop_rx: oneshot::Receiver<()>, conn: Arc<Connection>) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = &mut stop_rx => None,
    };
    let reason = match exited {
        Some(Ok(status)) => format!("process exited ({status})"),
        Some(Err(e)) => format!("failed to wait on process: {e}"),
        None => {
            match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(bridge = %conn.label(), ?status, "bridge process exited");
                }
                Ok(Err(e)) => {
                    tracing::warn!(bridge = %conn.label(), error = %e, "error waiting for bridge process");
                }
                Err(_) => {
                    tracing::warn!(bridge = %conn.label(), "bridge process did not exit within grace period, killing");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(bridge = %conn.label(), error = %e, "failed to kill bridge process");
                    }
                }
            }
            "bridge shut down".to_string()
        }
    };
    conn.fail(&reason);
}

async fn log_stderr(bridge: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!(bridge = %bridge, stderr = %line, "bridge stderr"),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(bridge = %bridge, error = %e, "stopped reading bridge stderr");
                break;
            }
        }
    }
}
