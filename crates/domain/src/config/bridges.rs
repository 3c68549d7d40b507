//! Child tool-provider processes, one `[[bridges]]` table each.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for a single stdio bridge.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Unique identifier, used in logs and `taskgate probe <id>`.
    pub id: String,

    /// The command to spawn (e.g. `"npx"`).
    #[serde(default)]
    pub command: String,

    /// Arguments to pass to the command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Variables layered over the gateway's own environment.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Whether sessions share one process or each get their own.
    #[serde(default)]
    pub scope: BridgeScope,

    /// When a shared bridge's process is started.
    #[serde(default)]
    pub startup: BridgeStartup,

    /// Per-request reply deadline in milliseconds. `None` waits until the
    /// reply arrives or the process exits.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,

    /// Prepended to every advertised tool name (e.g. `"fs."`).
    #[serde(default)]
    pub tool_prefix: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BridgeScope {
    /// One process for the whole gateway, reference-counted by sessions.
    #[default]
    Shared,
    /// A private process per session, stopped when the session closes.
    Session,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BridgeStartup {
    /// Start on the first session handshake that needs the bridge.
    #[default]
    Lazy,
    /// Start at gateway boot and keep running until shutdown.
    Eager,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_bridge_defaults() {
        let raw = r#"
            id = "fs"
            command = "npx"
            args = ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]
        "#;
        let cfg: BridgeConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.id, "fs");
        assert_eq!(cfg.args.len(), 3);
        assert_eq!(cfg.scope, BridgeScope::Shared);
        assert_eq!(cfg.startup, BridgeStartup::Lazy);
        assert!(cfg.request_timeout_ms.is_none());
    }

    #[test]
    fn session_scope_and_env() {
        let raw = r#"
            id = "git"
            command = "git-mcp"
            scope = "session"
            startup = "eager"
            request_timeout_ms = 1500
            [env]
            GIT_DIR = "/repo/.git"
        "#;
        let cfg: BridgeConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.scope, BridgeScope::Session);
        assert_eq!(cfg.startup, BridgeStartup::Eager);
        assert_eq!(cfg.request_timeout_ms, Some(1500));
        assert_eq!(cfg.env.get("GIT_DIR").map(String::as_str), Some("/repo/.git"));
    }
}
