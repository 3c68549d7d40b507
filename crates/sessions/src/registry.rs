//! Session registry: one live endpoint per client session.
//!
//! A session id is absent (uninitialized) until a handshake creates it,
//! `Active` while it sits in the map, and `Closed` once removed. Closure is
//! the only path that removes an entry; it cancels the session's
//! [`CancellationToken`] so in-flight waits fail, then closes the endpoint.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use tg_domain::trace::TraceEvent;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Endpoint
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Whatever a session routes its requests to.
///
/// `close` is called exactly once, after the session has left the registry.
#[async_trait::async_trait]
pub trait Endpoint: Send + Sync + 'static {
    async fn close(&self);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Closed,
}

pub struct Session<E> {
    id: String,
    created_at: DateTime<Utc>,
    opened: Instant,
    last_seen: Mutex<Instant>,
    state: Mutex<SessionState>,
    calls: AtomicUsize,
    cancel: CancellationToken,
    endpoint: E,
}

impl<E> Session<E> {
    fn new(id: String, endpoint: E) -> Self {
        let now = Instant::now();
        Self {
            id,
            created_at: Utc::now(),
            opened: now,
            last_seen: Mutex::new(now),
            state: Mutex::new(SessionState::Active),
            calls: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
            endpoint,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Cancelled when the session closes.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Mark a call as running until the guard drops. A session with calls
    /// running is never reaped, and finishing a call counts as activity.
    pub fn begin_call(&self) -> CallGuard<'_, E> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        CallGuard { session: self }
    }

    pub fn calls_in_flight(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }
}

impl<E> fmt::Debug for Session<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("calls", &self.calls_in_flight())
            .finish()
    }
}

/// Returned by [`Session::begin_call`].
pub struct CallGuard<'a, E> {
    session: &'a Session<E>,
}

impl<E> Drop for CallGuard<'_, E> {
    fn drop(&mut self) {
        self.session.touch();
        self.session.calls.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Summary info returned by list endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub idle_secs: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("session already initialized: {0}")]
    AlreadyInitialized(String),
    #[error("session setup failed: {0}")]
    Setup(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Thread-safe map of live sessions.
pub struct SessionRegistry<E: Endpoint> {
    sessions: RwLock<HashMap<String, Arc<Session<E>>>>,
}

impl<E: Endpoint> Default for SessionRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Endpoint> SessionRegistry<E> {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session for a handshake request.
    ///
    /// `presented` is the session id the client sent along, if any. A live
    /// id means the client is handshaking twice, which is rejected without
    /// touching any state. Unknown or stale ids are ignored and a fresh id
    /// is generated server-side.
    ///
    /// `build` receives the new id and produces the endpoint; the session
    /// only becomes visible once it succeeds.
    pub async fn handshake<F, Fut>(
        &self,
        presented: Option<&str>,
        build: F,
    ) -> Result<Arc<Session<E>>, SessionError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<E, String>>,
    {
        if let Some(id) = presented {
            if self.sessions.read().contains_key(id) {
                TraceEvent::HandshakeRejected {
                    session_id: id.to_owned(),
                    reason: "already initialized".into(),
                }
                .emit();
                return Err(SessionError::AlreadyInitialized(id.to_owned()));
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let endpoint = build(id.clone()).await.map_err(SessionError::Setup)?;
        let session = Arc::new(Session::new(id.clone(), endpoint));

        let prev = self.sessions.write().insert(id.clone(), session.clone());
        // A collision would silently replace a live session.
        debug_assert!(prev.is_none(), "session id collision: {id}");

        tracing::info!(session_id = %id, "session opened");
        Ok(session)
    }

    /// Look up an active session and mark it as seen.
    pub fn get(&self, id: &str) -> Result<Arc<Session<E>>, SessionError> {
        let session = self
            .sessions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_owned()))?;
        session.touch();
        Ok(session)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.read().contains_key(id)
    }

    /// Close a session: remove it, cancel its in-flight work, close its
    /// endpoint. Unknown ids yield [`SessionError::NotFound`].
    pub async fn close(&self, id: &str, reason: &str) -> Result<(), SessionError> {
        let session = self
            .sessions
            .write()
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.to_owned()))?;
        Self::teardown(session, reason).await;
        Ok(())
    }

    /// Close every session idle for longer than `max_idle` with no call
    /// running. Returns the number closed.
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let expired: Vec<Arc<Session<E>>> = {
            let mut sessions = self.sessions.write();
            let ids: Vec<String> = sessions
                .values()
                .filter(|s| s.calls_in_flight() == 0 && s.idle_for() > max_idle)
                .map(|s| s.id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        let count = expired.len();
        for session in expired {
            Self::teardown(session, "idle timeout").await;
        }
        if count > 0 {
            tracing::info!(count, "reaped idle sessions");
        }
        count
    }

    /// Close every session (gateway shutdown).
    pub async fn close_all(&self) -> usize {
        let all: Vec<Arc<Session<E>>> = self.sessions.write().drain().map(|(_, s)| s).collect();
        let count = all.len();
        let futs: Vec<_> = all
            .into_iter()
            .map(|s| Self::teardown(s, "shutdown"))
            .collect();
        futures_util::future::join_all(futs).await;
        count
    }

    pub fn list(&self) -> Vec<SessionInfo> {
        let mut out: Vec<SessionInfo> = self
            .sessions
            .read()
            .values()
            .map(|s| SessionInfo {
                session_id: s.id.clone(),
                created_at: s.created_at,
                idle_secs: s.idle_for().as_secs(),
            })
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    async fn teardown(session: Arc<Session<E>>, reason: &str) {
        *session.state.lock() = SessionState::Closed;
        session.cancel.cancel();
        session.endpoint.close().await;

        TraceEvent::SessionClosed {
            session_id: session.id.clone(),
            reason: reason.to_owned(),
            lifetime_ms: session.opened.elapsed().as_millis() as u64,
        }
        .emit();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
