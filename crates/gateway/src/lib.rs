//! The taskgate HTTP gateway: session-scoped tool tables served over
//! JSON-RPC, backed by the task CLI and stdio tool-provider bridges.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod endpoint;
pub mod rpc;
pub mod state;
pub mod telemetry;
