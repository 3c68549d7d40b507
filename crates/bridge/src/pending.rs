//! In-flight request table.
//!
//! Every request is registered here before its bytes are written. A reply
//! resolves its entry exactly once; a caller that gives up (timeout,
//! cancellation) removes its entry through the [`PendingSlot`] drop guard.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::BridgeError;
use crate::protocol::JsonRpcResponse;

type Reply = Result<Value, BridgeError>;

struct PendingCall {
    method: String,
    issued_at: Instant,
    tx: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct Inner {
    calls: HashMap<u64, PendingCall>,
    last_issued: u64,
    closed: Option<String>,
}

/// What happened to an incoming reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Delivered,
    /// The id was issued but is no longer waiting (late or duplicate reply).
    Stale,
    /// The id was never issued.
    Unknown,
}

#[derive(Default)]
pub struct PendingCalls {
    inner: Mutex<Inner>,
}

impl PendingCalls {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Allocate the next id and register a waiter for it.
    ///
    /// Ids start at 1 and strictly increase. Fails once the table has been
    /// closed by a bridge failure.
    pub fn register(self: &Arc<Self>, method: &str) -> Result<PendingSlot, BridgeError> {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        if let Some(reason) = &inner.closed {
            return Err(BridgeError::Unavailable(reason.clone()));
        }
        inner.last_issued += 1;
        let id = inner.last_issued;
        inner.calls.insert(
            id,
            PendingCall {
                method: method.to_owned(),
                issued_at: Instant::now(),
                tx,
            },
        );
        Ok(PendingSlot {
            id,
            rx,
            table: Arc::clone(self),
        })
    }

    /// Route a reply to its waiter.
    pub fn resolve(&self, resp: JsonRpcResponse) -> Resolution {
        let id = resp.id;
        let (call, last_issued) = {
            let mut inner = self.inner.lock();
            (inner.calls.remove(&id), inner.last_issued)
        };
        let Some(call) = call else {
            return if id >= 1 && id <= last_issued {
                Resolution::Stale
            } else {
                Resolution::Unknown
            };
        };
        tracing::trace!(
            id,
            method = %call.method,
            elapsed_ms = call.issued_at.elapsed().as_millis() as u64,
            "bridge reply received"
        );
        let reply = resp.into_result().map_err(BridgeError::Remote);
        // The waiter may have been dropped between remove and send.
        let _ = call.tx.send(reply);
        Resolution::Delivered
    }

    /// Fail every waiter and refuse new registrations. Returns how many
    /// waiters were failed. Calling it again is a no-op.
    pub fn close(&self, reason: &str) -> usize {
        let drained: Vec<PendingCall> = {
            let mut inner = self.inner.lock();
            if inner.closed.is_some() {
                return 0;
            }
            inner.closed = Some(reason.to_owned());
            inner.calls.drain().map(|(_, c)| c).collect()
        };
        let count = drained.len();
        for call in drained {
            let _ = call
                .tx
                .send(Err(BridgeError::Unavailable(reason.to_owned())));
        }
        count
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed.is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn forget(&self, id: u64) {
        self.inner.lock().calls.remove(&id);
    }
}

/// A registered request waiting for its reply.
///
/// Dropping the slot before the reply arrives removes the entry, so a late
/// reply is reported as [`Resolution::Stale`] instead of leaking.
pub struct PendingSlot {
    id: u64,
    rx: oneshot::Receiver<Reply>,
    table: Arc<PendingCalls>,
}

impl PendingSlot {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn wait(mut self) -> Reply {
        match (&mut self.rx).await {
            Ok(reply) => reply,
            Err(_) => Err(BridgeError::Unavailable("bridge connection dropped".into())),
        }
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.table.forget(self.id);
    }
}
