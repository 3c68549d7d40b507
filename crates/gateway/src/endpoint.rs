//! The per-session endpoint: a frozen tool table plus the bridge leases
//! backing its remote rows.

use std::sync::Arc;

use parking_lot::Mutex;

use tg_bridge::{BridgeLease, BridgePool};
use tg_domain::tool::ToolTable;
use tg_domain::trace::TraceEvent;
use tg_sessions::{Endpoint, WorkdirStore};

use crate::state::AppState;

pub struct GatewayEndpoint {
    session_id: String,
    tools: ToolTable,
    leases: Mutex<Vec<BridgeLease>>,
    pool: Arc<BridgePool>,
    workdirs: Arc<WorkdirStore>,
}

impl GatewayEndpoint {
    /// Build the tool table for a new session.
    ///
    /// CLI rows go in first so they win name collisions. Each configured
    /// bridge is leased and started; a bridge that fails to come up is
    /// logged and left out rather than failing the handshake.
    pub async fn open(state: &AppState, session_id: String) -> Self {
        let mut tools = ToolTable::new();
        tools.extend(state.cli_tools.iter().cloned());

        let opened = futures_util::future::join_all(state.pool.acquire_all().into_iter().map(
            |lease| async move {
                let result = lease.bridge().tool_set().await;
                (lease, result)
            },
        ))
        .await;

        let mut leases = Vec::new();
        for (lease, result) in opened {
            match result {
                Ok(entries) => {
                    let added = tools.extend(entries);
                    tracing::debug!(
                        session_id = %session_id,
                        bridge = %lease.bridge().id(),
                        tools = added,
                        "bridge tools registered"
                    );
                    leases.push(lease);
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        bridge = %lease.bridge().id(),
                        error = %e,
                        "bridge unavailable, skipping its tools"
                    );
                    state.pool.release(lease).await;
                }
            }
        }

        TraceEvent::SessionOpened {
            session_id: session_id.clone(),
            tools: tools.len(),
            bridges: leases.len(),
        }
        .emit();

        Self {
            session_id,
            tools,
            leases: Mutex::new(leases),
            pool: Arc::clone(&state.pool),
            workdirs: Arc::clone(&state.workdirs),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn tools(&self) -> &ToolTable {
        &self.tools
    }

    pub fn bridge_count(&self) -> usize {
        self.leases.lock().len()
    }
}

#[async_trait::async_trait]
impl Endpoint for GatewayEndpoint {
    async fn close(&self) {
        let leases: Vec<BridgeLease> = std::mem::take(&mut *self.leases.lock());
        for lease in leases {
            self.pool.release(lease).await;
        }
        self.workdirs.forget(&self.session_id);
    }
}
