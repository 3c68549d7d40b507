//! Exposes a bridge's declared tools as tool-table rows.

use std::sync::Arc;

use serde_json::Value;

use tg_domain::tool::{CallContext, ToolEntry, ToolError, ToolHandler, ToolResult};

use crate::bridge::StdioBridge;
use crate::error::BridgeError;

/// Forwards calls for one remote tool to its bridge.
struct RemoteTool {
    bridge: Arc<StdioBridge>,
    /// The name the child knows the tool by (no prefix).
    remote_name: String,
}

#[async_trait::async_trait]
impl ToolHandler for RemoteTool {
    async fn call(&self, ctx: CallContext, args: Value) -> ToolResult {
        tracing::debug!(
            session = %ctx.session_id,
            bridge = %self.bridge.id(),
            tool = %self.remote_name,
            "forwarding tool call"
        );
        self.bridge
            .call_tool(&self.remote_name, args)
            .await
            .map_err(into_tool_error)
    }
}

fn into_tool_error(err: BridgeError) -> ToolError {
    match err {
        BridgeError::Remote(e) => ToolError::Failed(e.message),
        BridgeError::Timeout(_) => ToolError::Timeout(err.to_string()),
        BridgeError::Unavailable(_) | BridgeError::Spawn(_) | BridgeError::Handshake(_) => {
            ToolError::Unavailable(err.to_string())
        }
        BridgeError::Io(_) | BridgeError::Protocol(_) => ToolError::Failed(err.to_string()),
    }
}

impl StdioBridge {
    /// Start the bridge if needed and build one tool entry per declared
    /// tool, renamed with the configured prefix.
    pub async fn tool_set(self: &Arc<Self>) -> Result<Vec<ToolEntry>, BridgeError> {
        let prefix = self.spec().tool_prefix.clone();
        let tools = self.list_tools().await?;
        Ok(tools
            .into_iter()
            .map(|def| {
                let remote_name = def.name.clone();
                let mut definition = def;
                if let Some(p) = prefix.as_deref().filter(|p| !p.is_empty()) {
                    definition.name = format!("{p}{remote_name}");
                }
                ToolEntry::new(
                    definition,
                    Arc::new(RemoteTool {
                        bridge: Arc::clone(self),
                        remote_name,
                    }),
                )
            })
            .collect())
    }
}
