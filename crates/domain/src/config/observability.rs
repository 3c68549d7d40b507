use serde::{Deserialize, Serialize};

/// `[observability]`: log output and optional trace export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Output format of the `serve` log stream.
    pub log_format: LogFormat,
    /// OTLP/gRPC collector (e.g. `http://localhost:4317`). Unset disables
    /// span export.
    pub otlp_endpoint: Option<String>,
    /// `service.name` reported with exported spans.
    pub service_name: String,
    /// Fraction of traces exported, from `0.0` to `1.0`.
    pub sample_rate: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            otlp_endpoint: None,
            service_name: "taskgate".into(),
            sample_rate: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable single-line output.
    Compact,
}
