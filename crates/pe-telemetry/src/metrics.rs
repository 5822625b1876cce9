//! Prometheus metrics for the assessment orchestrator.
//!
//! All metrics follow the naming convention: `pe_<metric>_<unit>`
//!
//! ## Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `pe_operations_total` | Counter | `kind`, `outcome` |
//! | `pe_operation_duration_seconds` | Histogram | `kind` |
//! | `pe_status_updates_total` | Counter | |
//! | `pe_context_switches_total` | Counter | `what` |

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Finished operations by kind and outcome
    pub static ref OPERATIONS: CounterVec = CounterVec::new(
        Opts::new("pe_operations_total", "Finished assessment operations"),
        &["kind", "outcome"]  // kind: submit/refresh/decrypt, outcome: ok/invalid/unauthorized/stale/failed/rejected
    ).expect("metric creation failed");

    /// Operation duration histogram
    pub static ref OPERATION_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "pe_operation_duration_seconds",
            "Time from dispatch to completion"
        ).buckets(exponential_buckets(0.001, 2.0, 16).expect("valid buckets")),
        &["kind"]
    ).expect("metric creation failed");

    /// Status overwrites observed
    pub static ref STATUS_UPDATES: Counter = Counter::new(
        "pe_status_updates_total",
        "Number of status overwrites observed"
    ).expect("metric creation failed");

    /// Identity changes applied
    pub static ref CONTEXT_SWITCHES: CounterVec = CounterVec::new(
        Opts::new("pe_context_switches_total", "Network or account switches applied"),
        &["what"]  // network/account
    ).expect("metric creation failed");
}

/// Handle keeping the registry alive
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Fails if called twice.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(OPERATIONS.clone()),
        Box::new(OPERATION_DURATION.clone()),
        Box::new(STATUS_UPDATES.clone()),
        Box::new(CONTEXT_SWITCHES.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Count a finished operation.
pub fn record_operation(kind: &str, outcome: &str) {
    OPERATIONS.with_label_values(&[kind, outcome]).inc();
}

/// Count an identity change.
pub fn record_context_switch(what: &str) {
    CONTEXT_SWITCHES.with_label_values(&[what]).inc();
}

/// Timer guard observing an operation's duration on drop.
pub struct OperationTimer {
    kind: String,
    start: Instant,
}

impl OperationTimer {
    /// Start timing an operation of `kind`.
    pub fn start(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        OPERATION_DURATION
            .with_label_values(&[self.kind.as_str()])
            .observe(self.start.elapsed().as_secs_f64());
    }
}
