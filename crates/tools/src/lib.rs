//! Task-tracking tools backed by an external CLI.
//!
//! - [`catalog`]: the data-driven list of tools, their subcommands,
//!   argument specs and timeout classes.
//! - [`adapter`]: builds `<program> <subcommand> <args...>`, checks the
//!   project marker, runs it under a timeout.
//! - [`toolset`]: turns the catalog into tool-table rows bound to a
//!   session's sticky working directory.

pub mod adapter;
pub mod catalog;
pub mod error;
pub mod escape;
pub mod toolset;

pub use adapter::{CommandAdapter, CommandOutput};
pub use error::CommandError;
pub use toolset::CliToolSet;
