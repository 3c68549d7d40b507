//! `tg-bridge`: child tool providers spoken to over stdio.
//!
//! This crate provides:
//! - JSON-RPC 2.0 line framing and message types.
//! - A [`Connection`](transport::Connection) that correlates replies to
//!   requests by id, so concurrent calls may complete in any order.
//! - [`StdioBridge`], which owns one child process through its
//!   start / ready / failed lifecycle and exposes its tools as tool-table
//!   rows.
//! - [`BridgePool`], which decides which sessions share which child.
//!
//! # Usage
//!
//! ```rust,ignore
//! let pool = BridgePool::new(config.bridges.clone());
//! for lease in pool.acquire_all() {
//!     let entries = lease.bridge().tool_set().await?;
//!     table.extend(entries);
//! }
//! ```

pub mod bridge;
pub mod error;
pub mod framing;
pub mod pending;
pub mod pool;
pub mod protocol;
pub mod toolset;
pub mod transport;

pub use bridge::{BridgeSpec, BridgeStatus, StdioBridge};
pub use error::BridgeError;
pub use pool::{BridgeInfo, BridgeLease, BridgePool};
