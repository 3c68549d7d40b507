//! Host → container path translation.
//!
//! Matching is on the literal prefix only: no `..` collapsing, no symlink
//! resolution, no trailing-slash handling. It offers no protection against
//! path traversal.

use tg_domain::config::PathsConfig;

#[derive(Debug, Clone)]
pub struct PathResolver {
    host_root: String,
    container_root: String,
}

impl PathResolver {
    pub fn new(host_root: impl Into<String>, container_root: impl Into<String>) -> Self {
        Self {
            host_root: host_root.into(),
            container_root: container_root.into(),
        }
    }

    pub fn from_config(cfg: &PathsConfig) -> Self {
        Self::new(cfg.host_root.clone(), cfg.container_root.clone())
    }

    /// Replace a leading `host_root` with `container_root`; anything else is
    /// returned unchanged. An empty host root disables translation.
    pub fn resolve(&self, input: &str) -> String {
        if self.host_root.is_empty() {
            return input.to_owned();
        }
        match input.strip_prefix(self.host_root.as_str()) {
            Some(rest) => format!("{}{rest}", self.container_root),
            None => input.to_owned(),
        }
    }
}
