use serde::{Deserialize, Serialize};

/// Host-to-container path translation and the fallback working directory.
///
/// Clients see host paths (e.g. `/Users/me/projects/app`); the gateway runs
/// the wrapped CLI against the container mount of the same tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Literal prefix of host-visible paths. Empty disables translation.
    #[serde(default)]
    pub host_root: String,
    /// Replacement for `host_root` inside the container.
    #[serde(default = "d_container_root")]
    pub container_root: String,
    /// Working directory used until a session supplies its own.
    #[serde(default = "d_default_workdir")]
    pub default_workdir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            host_root: String::new(),
            container_root: d_container_root(),
            default_workdir: d_default_workdir(),
        }
    }
}

fn d_container_root() -> String {
    "/workspace".into()
}

fn d_default_workdir() -> String {
    "/workspace".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_translation() {
        let cfg: PathsConfig = toml::from_str("").unwrap();
        assert!(cfg.host_root.is_empty());
        assert_eq!(cfg.default_workdir, "/workspace");
    }
}
