use crate::protocol::JsonRpcError;

/// Errors surfaced by a stdio bridge.
///
/// Cloneable so a single child failure can be fanned out to every caller
/// still waiting on a reply.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    #[error("failed to spawn bridge process: {0}")]
    Spawn(String),

    #[error("bridge I/O error: {0}")]
    Io(String),

    #[error("bridge handshake failed: {0}")]
    Handshake(String),

    #[error("bridge unavailable: {0}")]
    Unavailable(String),

    #[error("bridge request timed out after {0}ms")]
    Timeout(u64),

    #[error("{0}")]
    Remote(JsonRpcError),

    #[error("malformed bridge reply: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}
