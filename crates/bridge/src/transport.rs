//! Request/reply correlation over a byte stream pair.
//!
//! A [`Connection`] owns two background tasks. The writer task drains a
//! queue of complete lines into the write half, so a caller that gives up
//! never leaves half a message on the wire. The reader task frames the read
//! half into lines and routes each reply to its waiter by id. Callers only
//! enqueue and wait, so any number of requests may be in flight and replies
//! may arrive in any order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use tg_domain::trace::TraceEvent;

use crate::error::BridgeError;
use crate::framing::LineBuffer;
use crate::pending::{PendingCalls, Resolution};
use crate::protocol::{Incoming, JsonRpcNotification, JsonRpcRequest};

const READ_CHUNK: usize = 8 * 1024;

/// What the writer task is asked to do, in queue order.
enum Outbound {
    Line(String),
    Close(oneshot::Sender<()>),
}

pub struct Connection {
    label: String,
    outbox: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    pending: Arc<PendingCalls>,
    alive: AtomicBool,
    timeout: Option<Duration>,
}

impl Connection {
    /// Wrap a reader/writer pair and start the reader and writer tasks.
    ///
    /// The returned handle is the reader task. It ends when the reader hits
    /// EOF or an error, at which point the connection is marked failed and
    /// every in-flight request is failed.
    pub fn open<R, W>(
        label: impl Into<String>,
        reader: R,
        writer: W,
        timeout: Option<Duration>,
    ) -> (Arc<Self>, JoinHandle<()>)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Self {
            label: label.into(),
            outbox: Mutex::new(Some(tx)),
            pending: PendingCalls::new(),
            alive: AtomicBool::new(true),
            timeout,
        });
        tokio::spawn(write_loop(conn.label.clone(), writer, rx, Arc::downgrade(&conn)));
        let task = tokio::spawn(read_loop(reader, Arc::clone(&conn)));
        (conn, task)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Requests still waiting for a reply.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Send a request and wait for its reply, subject to the configured
    /// timeout.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, BridgeError> {
        self.request_with_timeout(method, params, self.timeout).await
    }

    /// Dropping the returned future abandons the wait only; a line that was
    /// queued is still written whole.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, BridgeError> {
        let slot = {
            // Ids are allocated and queued under one lock, so they reach the
            // wire in increasing order.
            let outbox = self.outbox.lock();
            let tx = outbox
                .as_ref()
                .ok_or_else(|| BridgeError::Unavailable("bridge input closed".into()))?;
            let slot = self.pending.register(method)?;
            let req = JsonRpcRequest::new(slot.id(), method, params);
            let mut line = serde_json::to_string(&req)?;
            line.push('\n');
            tracing::debug!(bridge = %self.label, id = slot.id(), method, "bridge request");
            tx.send(Outbound::Line(line))
                .map_err(|_| BridgeError::Unavailable("bridge writer stopped".into()))?;
            slot
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, slot.wait())
                .await
                .map_err(|_| BridgeError::Timeout(limit.as_millis() as u64))?,
            None => slot.wait().await,
        }
    }

    /// Queue a notification (no reply expected).
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), BridgeError> {
        let mut line = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        line.push('\n');
        self.outbox
            .lock()
            .as_ref()
            .ok_or_else(|| BridgeError::Unavailable("bridge input closed".into()))?
            .send(Outbound::Line(line))
            .map_err(|_| BridgeError::Unavailable("bridge writer stopped".into()))
    }

    /// Close the write half once every queued line is written. The peer
    /// sees EOF on its input.
    pub async fn close_input(&self) {
        let taken = self.outbox.lock().take();
        let Some(tx) = taken else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(Outbound::Close(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Mark the connection failed and fail every in-flight request.
    ///
    /// Only the first call has an effect.
    pub fn fail(&self, reason: &str) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        let failed_calls = self.pending.close(reason);
        if failed_calls > 0 {
            tracing::warn!(
                bridge = %self.label,
                failed_calls,
                reason,
                "bridge failed with requests in flight"
            );
        }
        TraceEvent::BridgeFailed {
            bridge_id: self.label.clone(),
            reason: reason.to_owned(),
            failed_calls,
        }
        .emit();
    }

    fn dispatch(&self, line: &str) {
        match Incoming::parse(line) {
            Some(Incoming::Response(resp)) => {
                let id = resp.id;
                match self.pending.resolve(resp) {
                    Resolution::Delivered => {}
                    Resolution::Stale => {
                        tracing::debug!(bridge = %self.label, id, "dropping late reply");
                    }
                    Resolution::Unknown => {
                        tracing::warn!(bridge = %self.label, id, "dropping reply for unknown id");
                    }
                }
            }
            Some(Incoming::ServerMessage { method }) => {
                tracing::debug!(bridge = %self.label, %method, "ignoring server-initiated message");
            }
            Some(Incoming::Unrecognized) => {
                tracing::debug!(bridge = %self.label, line, "ignoring unrecognized message");
            }
            None => {
                tracing::debug!(bridge = %self.label, line, "skipping non-JSON output");
            }
        }
    }
}

async fn write_loop<W>(
    label: String,
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    conn: Weak<Connection>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = rx.recv().await {
        match msg {
            Outbound::Line(line) => {
                let written = async {
                    writer.write_all(line.as_bytes()).await?;
                    writer.flush().await
                }
                .await;
                if let Err(e) = written {
                    if let Some(conn) = conn.upgrade() {
                        conn.fail(&format!("write error: {e}"));
                    }
                    return;
                }
            }
            Outbound::Close(ack) => {
                if let Err(e) = writer.shutdown().await {
                    tracing::debug!(bridge = %label, error = %e, "error closing bridge input");
                }
                let _ = ack.send(());
                return;
            }
        }
    }
}

async fn read_loop<R>(mut reader: R, conn: Arc<Connection>)
where
    R: AsyncRead + Unpin,
{
    let mut framer = LineBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    let reason = loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break "output closed".to_string(),
            Ok(n) => {
                for line in framer.push(&chunk[..n]) {
                    conn.dispatch(&line);
                }
            }
            Err(e) => break format!("read error: {e}"),
        }
    };
    if framer.pending_bytes() > 0 {
        tracing::debug!(
            bridge = %conn.label,
            bytes = framer.pending_bytes(),
            "discarding unterminated trailing output"
        );
    }
    conn.fail(&reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, ReadHalf, WriteHalf};

    /// The far end of a duplex pipe, playing the child process.
    struct Peer {
        lines: tokio::io::Lines<BufReader<ReadHalf<DuplexStream>>>,
        out: WriteHalf<DuplexStream>,
    }

    impl Peer {
        async fn next_request(&mut self) -> Value {
            let line = self.lines.next_line().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }

        async fn send(&mut self, raw: &str) {
            self.out.write_all(raw.as_bytes()).await.unwrap();
            self.out.write_all(b"\n").await.unwrap();
            self.out.flush().await.unwrap();
        }

        async fn reply(&mut self, id: u64, result: Value) {
            let msg = serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result });
            self.send(&msg.to_string()).await;
        }
    }

    fn connect(timeout: Option<Duration>) -> (Arc<Connection>, JoinHandle<()>, Peer) {
        connect_with_buffer(64 * 1024, timeout)
    }

    fn connect_with_buffer(
        buffer: usize,
        timeout: Option<Duration>,
    ) -> (Arc<Connection>, JoinHandle<()>, Peer) {
        let (ours, theirs) = tokio::io::duplex(buffer);
        let (r, w) = tokio::io::split(ours);
        let (pr, pw) = tokio::io::split(theirs);
        let (conn, task) = Connection::open("test", r, w, timeout);
        let peer = Peer {
            lines: BufReader::new(pr).lines(),
            out: pw,
        };
        (conn, task, peer)
    }

    #[tokio::test]
    async fn out_of_order_replies_reach_their_callers() {
        let (conn, _task, mut peer) = connect(None);

        let calls: Vec<_> = (1..=3)
            .map(|n| {
                let conn = Arc::clone(&conn);
                tokio::spawn(async move {
                    conn.request("tools/call", Some(serde_json::json!({ "n": n })))
                        .await
                })
            })
            .collect();

        let mut seen = Vec::new();
        for _ in 0..3 {
            let req = peer.next_request().await;
            seen.push((req["id"].as_u64().unwrap(), req["params"]["n"].clone()));
        }
        seen.sort_by_key(|(id, _)| *id);
        assert_eq!(seen.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1, 2, 3]);

        for idx in [2usize, 0, 1] {
            let (id, n) = &seen[idx];
            peer.reply(*id, serde_json::json!({ "echo": n })).await;
        }

        for (i, call) in calls.into_iter().enumerate() {
            let out = call.await.unwrap().unwrap();
            assert_eq!(out["echo"], (i + 1) as u64);
        }
        assert_eq!(conn.in_flight(), 0);
    }

    #[tokio::test]
    async fn noise_and_unknown_ids_do_not_disturb_waiters() {
        let (conn, _task, mut peer) = connect(None);
        let call = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.request("ping", None).await })
        };
        let req = peer.next_request().await;

        peer.send("server listening on stdio").await;
        peer.send("{not json").await;
        peer.send(r#"{"jsonrpc":"2.0","method":"notifications/message","params":{}}"#)
            .await;
        peer.send(r#"{"jsonrpc":"2.0","id":77,"result":{}}"#).await;
        peer.reply(req["id"].as_u64().unwrap(), serde_json::json!("pong"))
            .await;

        assert_eq!(call.await.unwrap().unwrap(), "pong");
        assert!(conn.is_alive());
    }

    #[tokio::test]
    async fn eof_fails_every_waiter() {
        let (conn, task, mut peer) = connect(None);
        let calls: Vec<_> = (0..4)
            .map(|_| {
                let conn = Arc::clone(&conn);
                tokio::spawn(async move { conn.request("slow", None).await })
            })
            .collect();
        for _ in 0..4 {
            peer.next_request().await;
        }
        drop(peer);

        let joined = tokio::time::timeout(Duration::from_secs(5), async {
            let mut out = Vec::new();
            for c in calls {
                out.push(c.await.unwrap());
            }
            out
        })
        .await
        .expect("waiters should be released");
        assert!(joined
            .iter()
            .all(|r| matches!(r, Err(BridgeError::Unavailable(_)))));
        task.await.unwrap();
        assert!(!conn.is_alive());

        let after = conn.request("late", None).await;
        assert!(after.is_err());
    }

    #[tokio::test]
    async fn timeout_removes_pending_entry() {
        let (conn, _task, mut peer) = connect(Some(Duration::from_millis(50)));
        let err = conn.request("slow", None).await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout(50)));
        assert_eq!(conn.in_flight(), 0);

        // A reply that shows up afterwards is dropped quietly.
        let req = peer.next_request().await;
        peer.reply(req["id"].as_u64().unwrap(), Value::Null).await;
        assert!(conn.is_alive());
    }

    #[tokio::test]
    async fn notifications_carry_no_id() {
        let (conn, _task, mut peer) = connect(None);
        conn.notify("notifications/initialized", None).await.unwrap();
        let msg = peer.next_request().await;
        assert_eq!(msg["method"], "notifications/initialized");
        assert!(msg.get("id").is_none());
    }

    #[tokio::test]
    async fn abandoned_request_is_still_written_whole() {
        // The pipe holds far less than one request, so the write is still
        // pending when the caller gives up.
        let (conn, _task, mut peer) = connect_with_buffer(256, None);
        let text = "x".repeat(4096);
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            conn.request(
                "tools/call",
                Some(serde_json::json!({ "name": "echo", "arguments": { "text": text } })),
            ),
        )
        .await;
        assert!(abandoned.is_err());

        let ping = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.request("ping", None).await })
        };

        let first = peer.next_request().await;
        assert_eq!(first["method"], "tools/call");
        assert_eq!(first["params"]["arguments"]["text"].as_str().unwrap().len(), 4096);
        let second = peer.next_request().await;
        assert_eq!(second["method"], "ping");
        peer.reply(second["id"].as_u64().unwrap(), serde_json::json!({}))
            .await;

        assert_eq!(ping.await.unwrap().unwrap(), serde_json::json!({}));
        assert_eq!(conn.in_flight(), 0);
        assert!(conn.is_alive());
    }

    #[tokio::test]
    async fn close_input_flushes_queued_lines_first() {
        let (conn, _task, mut peer) = connect(None);
        conn.notify("notifications/initialized", None).await.unwrap();
        conn.close_input().await;

        let msg = peer.next_request().await;
        assert_eq!(msg["method"], "notifications/initialized");
        assert!(peer.lines.next_line().await.unwrap().is_none());
        assert!(conn.notify("late", None).await.is_err());
    }
}
