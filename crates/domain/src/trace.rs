use serde::Serialize;

/// Structured trace events emitted across the taskgate crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionOpened {
        session_id: String,
        tools: usize,
        bridges: usize,
    },
    SessionClosed {
        session_id: String,
        reason: String,
        lifetime_ms: u64,
    },
    HandshakeRejected {
        session_id: String,
        reason: String,
    },
    BridgeStarted {
        bridge_id: String,
        pid: Option<u32>,
    },
    BridgeFailed {
        bridge_id: String,
        reason: String,
        failed_calls: usize,
    },
    BridgeStopped {
        bridge_id: String,
    },
    CommandInvoked {
        tool: String,
        exit_code: Option<i32>,
        duration_ms: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "tg_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_tag() {
        let ev = TraceEvent::BridgeFailed {
            bridge_id: "fs".into(),
            reason: "process exited".into(),
            failed_calls: 3,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["event"], "BridgeFailed");
        assert_eq!(json["failed_calls"], 3);
    }
}
