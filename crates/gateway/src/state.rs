use std::sync::Arc;
use std::time::Instant;

use tg_bridge::BridgePool;
use tg_domain::config::Config;
use tg_domain::tool::ToolEntry;
use tg_sessions::{SessionRegistry, WorkdirStore};

use crate::endpoint::GatewayEndpoint;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry<GatewayEndpoint>>,
    /// Sticky working directory per session.
    pub workdirs: Arc<WorkdirStore>,
    pub pool: Arc<BridgePool>,
    /// CLI catalog rows, cloned into every new session's tool table.
    /// Empty when `[cli] enabled = false`.
    pub cli_tools: Arc<Vec<ToolEntry>>,
    pub started_at: Instant,
}
