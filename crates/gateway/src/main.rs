use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tg_domain::config::{Config, CorsConfig};
use tg_gateway::cli::{self, Cli, Command, ConfigCommand};
use tg_gateway::rpc::SESSION_HEADER;
use tg_gateway::{api, bootstrap, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let command = Cli::parse().command.unwrap_or(Command::Serve);

    if let Command::Version = command {
        println!("taskgate {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let (config, config_path) = cli::load_config()?;

    match command {
        Command::Serve => {
            let provider = telemetry::init_server(&config.observability);
            tracing::info!(config = %config_path, "configuration loaded");
            let result = serve(Arc::new(config)).await;
            telemetry::shutdown(provider);
            result
        }
        Command::Config(ConfigCommand::Validate) => {
            if !cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Config(ConfigCommand::Show) => cli::config::show(&config),
        Command::Tools { json } => cli::tools::run(&config, json),
        Command::Probe { bridge_id } => {
            telemetry::init_cli();
            cli::probe::run(&config, &bridge_id).await
        }
        Command::Version => Ok(()),
    }
}

async fn serve(config: Arc<Config>) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config.clone())?;
    bootstrap::start_bridges(&state).await;
    bootstrap::spawn_background_tasks(&state);

    let server = &config.server;
    let app = api::router()
        .layer(DefaultBodyLimit::max(server.max_body_bytes))
        .layer(cors_layer(&server.cors))
        .layer(TraceLayer::new_for_http())
        .layer(tower::limit::ConcurrencyLimitLayer::new(server.max_concurrent_requests))
        .with_state(state.clone());

    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(
        addr = %addr,
        max_concurrent = server.max_concurrent_requests,
        "taskgate listening"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server error");

    // Sessions and bridges are torn down even if the server errored.
    bootstrap::shutdown(&state).await;
    served
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

/// CORS for browser clients. The session header must be both accepted and
/// exposed or the client cannot carry its session forward.
fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let session_header = HeaderName::from_static(SESSION_HEADER);
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, session_header.clone()])
        .expose_headers([session_header]);

    if cors.allows_any() {
        tracing::warn!("CORS allows every origin");
        return layer.allow_origin(Any);
    }

    // `http://host:*` entries match any numeric port on that host.
    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut any_port: Vec<String> = Vec::new();
    for origin in &cors.allowed_origins {
        if let Some(prefix) = origin.strip_suffix('*').filter(|p| p.ends_with(':')) {
            any_port.push(prefix.to_owned());
        } else if let Ok(value) = origin.parse::<HeaderValue>() {
            exact.push(value);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    if any_port.is_empty() {
        return layer.allow_origin(AllowOrigin::list(exact));
    }
    layer.allow_origin(AllowOrigin::predicate(move |origin, _| {
        if exact.iter().any(|e| e == origin) {
            return true;
        }
        let Ok(origin) = origin.to_str() else {
            return false;
        };
        any_port.iter().any(|prefix| {
            origin
                .strip_prefix(prefix.as_str())
                .is_some_and(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
        })
    }))
}
