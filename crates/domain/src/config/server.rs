use serde::{Deserialize, Serialize};

/// `[server]`: the HTTP listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// In-flight HTTP requests allowed across all sessions before new ones
    /// queue.
    pub max_concurrent_requests: usize,
    /// Largest accepted JSON-RPC request body.
    pub max_body_bytes: usize,
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8400,
            max_concurrent_requests: 256,
            max_body_bytes: 1024 * 1024,
            cors: CorsConfig::default(),
        }
    }
}

/// `[server.cors]`. Entries ending in `:*` match any port on that host;
/// a lone `"*"` allows every origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:*".into(), "http://127.0.0.1:*".into()],
        }
    }
}

impl CorsConfig {
    pub fn allows_any(&self) -> bool {
        self.allowed_origins.len() == 1 && self.allowed_origins[0] == "*"
    }
}
