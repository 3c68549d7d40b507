//! Session management for taskgate.
//!
//! - [`PathResolver`]: literal host-root → container-root path translation.
//! - [`WorkdirStore`]: the sticky per-session working directory.
//! - [`SessionRegistry`]: one live endpoint per session id, created on
//!   handshake and removed only on closure.

pub mod paths;
pub mod registry;
pub mod workdir;

pub use paths::PathResolver;
pub use registry::{CallGuard, Endpoint, Session, SessionError, SessionInfo, SessionRegistry, SessionState};
pub use workdir::WorkdirStore;
