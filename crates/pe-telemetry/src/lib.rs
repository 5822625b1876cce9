//! # PE Telemetry
//!
//! Observability for the assessment orchestrator.
//!
//! ## Components
//!
//! - Structured logs: pretty console output, JSON in containers
//! - Traces: OpenTelemetry OTLP export when an endpoint is configured
//! - Metrics: Prometheus counters and histograms, text-encoded on demand
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pe_telemetry::{TelemetryConfig, init_telemetry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pe_telemetry::TelemetryError> {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).await?;
//!     // Spans, logs and metrics are now being collected
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PE_SERVICE_NAME` | `pe-runtime` | Service name in logs and traces |
//! | `PE_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `PE_JSON_LOGS` | `false` | JSON log lines |
//! | `PE_CONSOLE_OUTPUT` | `true` | Console output |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | unset | OTLP collector; unset disables export |

#![warn(missing_docs)]

mod config;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, record_context_switch, record_operation, register_metrics, MetricsHandle,
    OperationTimer, CONTEXT_SWITCHES, OPERATIONS, OPERATION_DURATION, STATUS_UPDATES,
};
pub use tracing_setup::{init_tracing, TracingGuard};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Subscriber or exporter could not be installed.
    #[error("Failed to initialize tracing: {0}")]
    TracerInit(String),

    /// Metric registration or encoding failed.
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    /// Configuration rejected.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize metrics and tracing.
///
/// Returns a guard that must be held for the lifetime of the application.
/// When dropped, it flushes pending spans.
pub async fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics_handle = register_metrics()?;
    let tracing_guard = init_tracing(&config).await?;

    Ok(TelemetryGuard {
        _tracing: tracing_guard,
        _metrics: metrics_handle,
    })
}

/// Guard that keeps telemetry active. Drop to flush and shutdown.
pub struct TelemetryGuard {
    _tracing: TracingGuard,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}
