//! Subscriber setup for the `taskgate` binary.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig as _;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use tg_domain::config::{LogFormat, ObservabilityConfig};

const DEFAULT_SERVE_FILTER: &str = "info,tg_gateway=debug";

/// Logging for `serve`: the configured format on stdout, plus OTLP span
/// export when an endpoint is set.
///
/// Hand the returned provider to [`shutdown`] on exit so buffered spans
/// are flushed.
pub fn init_server(obs: &ObservabilityConfig) -> Option<SdkTracerProvider> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_SERVE_FILTER));

    let fmt_layer = match obs.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
    };

    let provider = match obs.otlp_endpoint.as_deref() {
        Some(endpoint) => match tracer_provider(obs, endpoint) {
            Ok(provider) => Some(provider),
            Err(e) => {
                // The subscriber is not installed yet.
                eprintln!("taskgate: OTLP export to {endpoint} disabled: {e:#}");
                None
            }
        },
        None => None,
    };
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("taskgate")));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(otel_layer)
        .init();

    if let Some(endpoint) = obs.otlp_endpoint.as_deref().filter(|_| provider.is_some()) {
        tracing::info!(endpoint, sample_rate = obs.sample_rate, "OTLP span export enabled");
    }
    provider
}

/// Logging for one-shot commands: compact, on stderr, `warn` unless
/// `RUST_LOG` says otherwise, so stdout stays clean for command output.
pub fn init_cli() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

pub fn shutdown(provider: Option<SdkTracerProvider>) {
    if let Some(provider) = provider {
        if let Err(e) = provider.shutdown() {
            tracing::warn!(error = ?e, "OpenTelemetry tracer provider shutdown failed");
        }
    }
}

fn tracer_provider(obs: &ObservabilityConfig, endpoint: &str) -> anyhow::Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let resource = opentelemetry_sdk::Resource::builder()
        .with_service_name(obs.service_name.clone())
        .build();
    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(Sampler::TraceIdRatioBased(obs.sample_rate))
        .with_resource(resource)
        .build())
}
