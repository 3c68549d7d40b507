//! Shared types for the taskgate crates: configuration, errors, the tool
//! table that session endpoints expose, and structured trace events.

pub mod config;
pub mod error;
pub mod tool;
pub mod trace;
