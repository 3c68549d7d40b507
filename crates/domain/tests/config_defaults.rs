use tg_domain::config::{BridgeScope, Config};

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn default_cors_allows_only_localhost() {
    let config = Config::default();
    assert!(config.server.cors.allowed_origins.contains(&"http://localhost:*".to_string()));
    assert!(config.server.cors.allowed_origins.contains(&"http://127.0.0.1:*".to_string()));
}

#[test]
fn empty_document_is_a_complete_config() {
    let config: Config = toml::from_str("").unwrap();
    assert!(config.cli.enabled);
    assert!(config.bridges.is_empty());
    assert_eq!(config.sessions.idle_timeout_secs, 3600);
}

#[test]
fn full_document_parses() {
    let toml_str = r#"
[server]
port = 9000

[paths]
host_root = "/Users/dev/projects"
container_root = "/workspace"
default_workdir = "/workspace/default"

[cli]
program = "task-master"
marker_dir = ".taskmaster"

[cli.timeouts]
init_secs = 600

[sessions]
idle_timeout_secs = 0

[[bridges]]
id = "fs"
command = "npx"
args = ["-y", "@modelcontextprotocol/server-filesystem", "/workspace"]

[[bridges]]
id = "scratch"
command = "scratch-mcp"
scope = "session"
tool_prefix = "scratch."
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.port, 9000);
    assert_eq!(config.paths.host_root, "/Users/dev/projects");
    assert_eq!(config.cli.timeouts.init_secs, 600);
    assert_eq!(config.sessions.idle_timeout_secs, 0);
    assert_eq!(config.bridges.len(), 2);
    assert_eq!(config.bridges[1].scope, BridgeScope::Session);
    assert_eq!(config.bridges[1].tool_prefix.as_deref(), Some("scratch."));
    assert!(config.validate().is_empty());
}
