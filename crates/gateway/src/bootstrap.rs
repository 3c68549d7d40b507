//! AppState construction and background-task spawning extracted from `main.rs`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tg_bridge::BridgePool;
use tg_domain::config::{Config, ConfigSeverity};
use tg_sessions::{SessionRegistry, WorkdirStore};
use tg_tools::{CliToolSet, CommandAdapter};

use crate::state::AppState;

/// Validate config and wire every subsystem into an [`AppState`].
///
/// Does not start any bridge; see [`start_bridges`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Working directories ──────────────────────────────────────────
    let workdirs = Arc::new(WorkdirStore::from_config(&config.paths));
    tracing::info!(
        default = %config.paths.default_workdir,
        host_root = %config.paths.host_root,
        container_root = %config.paths.container_root,
        "workdir store ready"
    );

    // ── CLI tools ────────────────────────────────────────────────────
    let cli_tools = if config.cli.enabled {
        let adapter = Arc::new(CommandAdapter::from_config(&config.cli));
        let entries = CliToolSet::new(adapter, Arc::clone(&workdirs)).entries();
        tracing::info!(program = %config.cli.program, tools = entries.len(), "CLI tools ready");
        entries
    } else {
        tracing::info!("CLI tools disabled");
        Vec::new()
    };

    // ── Bridges ──────────────────────────────────────────────────────
    let pool = BridgePool::new(config.bridges.clone());
    tracing::info!(bridges = config.bridges.len(), "bridge pool ready");

    Ok(AppState {
        config,
        registry: Arc::new(SessionRegistry::new()),
        workdirs,
        pool,
        cli_tools: Arc::new(cli_tools),
        started_at: Instant::now(),
    })
}

/// Start every eagerly configured shared bridge.
pub async fn start_bridges(state: &AppState) {
    let started = state.pool.start_eager().await;
    if started > 0 {
        tracing::info!(started, "eager bridges started");
    }
}

/// Spawn the idle-session reaper when `sessions.idle_timeout_secs > 0`.
pub fn spawn_background_tasks(state: &AppState) {
    let cfg = &state.config.sessions;
    if cfg.idle_timeout_secs == 0 {
        return;
    }
    let registry = state.registry.clone();
    let max_idle = Duration::from_secs(cfg.idle_timeout_secs);
    let period = Duration::from_secs(cfg.reap_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            registry.reap_idle(max_idle).await;
        }
    });
}

/// Close every session, then stop the bridges they leave behind.
pub async fn shutdown(state: &AppState) {
    let closed = state.registry.close_all().await;
    state.pool.shutdown().await;
    tracing::info!(sessions = closed, "gateway stopped");
}
