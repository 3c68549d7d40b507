mod bridges;
mod cli;
mod observability;
mod paths;
mod server;
mod sessions;

pub use bridges::*;
pub use cli::*;
pub use observability::*;
pub use paths::*;
pub use server::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub cli: CliConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    /// Child tool-provider processes exposed through stdio bridges.
    #[serde(default)]
    pub bridges: Vec<BridgeConfig>,
}

impl Config {
    /// Read a TOML config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let shown = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::ReadConfig {
            path: shown.clone(),
            source,
        })?;
        toml::from_str(&raw).map_err(|e| Error::ParseConfig {
            path: shown,
            message: e.to_string(),
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut push = |severity, field: String, message: &str| {
            errors.push(ConfigError {
                severity,
                field,
                message: message.into(),
            });
        };

        if self.server.port == 0 {
            push(ConfigSeverity::Error, "server.port".into(), "port must be greater than 0");
        }
        if self.server.host.is_empty() {
            push(ConfigSeverity::Error, "server.host".into(), "host must not be empty");
        }
        if self.server.max_body_bytes == 0 {
            push(
                ConfigSeverity::Error,
                "server.max_body_bytes".into(),
                "max_body_bytes must be greater than 0",
            );
        }
        if self.server.max_concurrent_requests == 0 {
            push(
                ConfigSeverity::Error,
                "server.max_concurrent_requests".into(),
                "max_concurrent_requests must be greater than 0",
            );
        }

        if self.paths.default_workdir.is_empty() {
            push(
                ConfigSeverity::Error,
                "paths.default_workdir".into(),
                "default working directory must not be empty",
            );
        }
        if !self.paths.host_root.is_empty()
            && self.paths.container_root.starts_with(&self.paths.host_root)
        {
            push(
                ConfigSeverity::Warning,
                "paths.container_root".into(),
                "container root starts with the host root; path translation is not idempotent",
            );
        }

        if self.cli.enabled {
            if self.cli.program.trim().is_empty() {
                push(ConfigSeverity::Error, "cli.program".into(), "program must not be empty");
            }
            if self.cli.marker_dir.trim().is_empty() {
                push(
                    ConfigSeverity::Error,
                    "cli.marker_dir".into(),
                    "marker directory must not be empty",
                );
            }
            let t = &self.cli.timeouts;
            if t.read_secs == 0 || t.write_secs == 0 || t.init_secs == 0 {
                push(
                    ConfigSeverity::Error,
                    "cli.timeouts".into(),
                    "timeouts must be greater than 0",
                );
            }
        }

        if self.sessions.idle_timeout_secs > 0 && self.sessions.reap_interval_secs == 0 {
            push(
                ConfigSeverity::Error,
                "sessions.reap_interval_secs".into(),
                "reap interval must be greater than 0 when idle_timeout_secs is set",
            );
        }

        let mut seen = HashSet::new();
        for (i, bridge) in self.bridges.iter().enumerate() {
            if bridge.id.is_empty() {
                push(
                    ConfigSeverity::Error,
                    format!("bridges[{i}].id"),
                    "bridge id must not be empty",
                );
            } else if !seen.insert(bridge.id.as_str()) {
                push(
                    ConfigSeverity::Error,
                    format!("bridges[{i}].id"),
                    "bridge id must be unique",
                );
            }
            if bridge.command.is_empty() {
                push(
                    ConfigSeverity::Error,
                    format!("bridges[{i}].command"),
                    "bridge command must not be empty",
                );
            }
            if bridge.scope == BridgeScope::Session && bridge.startup == BridgeStartup::Eager {
                push(
                    ConfigSeverity::Warning,
                    format!("bridges[{i}].startup"),
                    "session-scoped bridges start per session; eager startup is ignored",
                );
            }
        }

        if !self.cli.enabled && self.bridges.is_empty() {
            push(
                ConfigSeverity::Warning,
                "bridges".into(),
                "CLI tools are disabled and no bridges are configured; sessions will expose no tools",
            );
        }

        if self.server.cors.allows_any() {
            push(
                ConfigSeverity::Warning,
                "server.cors.allowed_origins".into(),
                "wildcard \"*\" allows all origins (not recommended for production)",
            );
        }

        errors
    }
}
