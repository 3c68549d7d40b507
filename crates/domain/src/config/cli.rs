use serde::{Deserialize, Serialize};

/// The wrapped task-tracking CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Expose the CLI tool catalog in every session.
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Program placed at the head of every invocation line. Inserted
    /// verbatim, so it may carry leading arguments (e.g. `"npx task-master"`).
    #[serde(default = "d_program")]
    pub program: String,
    /// Directory (relative to the working directory) whose presence marks an
    /// initialized project.
    #[serde(default = "d_marker_dir")]
    pub marker_dir: String,
    #[serde(default)]
    pub timeouts: CliTimeouts,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: d_program(),
            marker_dir: d_marker_dir(),
            timeouts: CliTimeouts::default(),
        }
    }
}

/// Per-class invocation timeouts, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliTimeouts {
    #[serde(default = "d_read_secs")]
    pub read_secs: u64,
    #[serde(default = "d_write_secs")]
    pub write_secs: u64,
    #[serde(default = "d_init_secs")]
    pub init_secs: u64,
}

impl Default for CliTimeouts {
    fn default() -> Self {
        Self {
            read_secs: d_read_secs(),
            write_secs: d_write_secs(),
            init_secs: d_init_secs(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_program() -> String {
    "task-master".into()
}
fn d_marker_dir() -> String {
    ".taskmaster".into()
}
fn d_read_secs() -> u64 {
    30
}
fn d_write_secs() -> u64 {
    120
}
fn d_init_secs() -> u64 {
    300
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_timeouts_keep_other_defaults() {
        let toml_str = r#"
            program = "tm"
            [timeouts]
            read_secs = 5
        "#;
        let cfg: CliConfig = toml::from_str(toml_str).unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.program, "tm");
        assert_eq!(cfg.timeouts.read_secs, 5);
        assert_eq!(cfg.timeouts.write_secs, 120);
        assert_eq!(cfg.marker_dir, ".taskmaster");
    }
}
