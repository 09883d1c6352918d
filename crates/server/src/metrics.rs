//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the harvest server:
//! - HTTP request metrics (latency, counts)
//! - Task counts by status (collected dynamically)
//! - Poller and pipeline run state (collected dynamically)
//!
//! Core metrics (searches, indexer health, transfers, imports) are registered
//! into the same registry.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use tracing::warn;

use harvest_core::TaskStatus;

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "harvest_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("harvest_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "harvest_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Task Metrics (collected dynamically)
// =============================================================================

/// Tasks by current status.
pub static TASKS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("harvest_tasks_by_status", "Current task count by status"),
        &["status"],
    )
    .unwrap()
});

// =============================================================================
// Background work (collected dynamically)
// =============================================================================

/// Poller running state (1 = running, 0 = stopped).
pub static POLLER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "harvest_poller_running",
        "Whether the download poller is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Pipeline run state (1 = a run is in progress).
pub static PIPELINE_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "harvest_pipeline_running",
        "Whether a pipeline run is in progress",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Tasks
    registry
        .register(Box::new(TASKS_BY_STATUS.clone()))
        .unwrap();

    // Background work
    registry.register(Box::new(POLLER_RUNNING.clone())).unwrap();
    registry
        .register(Box::new(PIPELINE_RUNNING.clone()))
        .unwrap();

    // Core metrics (search, indexers, download client, import)
    for metric in harvest_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the store and background loops.
pub async fn collect_dynamic_metrics(state: &AppState) {
    POLLER_RUNNING.set(state.poller().map_or(0, |p| p.is_running() as i64));
    PIPELINE_RUNNING.set(state.runs().is_running() as i64);

    match state.tasks().count_by_status() {
        Ok(counts) => {
            for status in TaskStatus::ALL {
                let count = counts
                    .iter()
                    .find(|(s, _)| *s == status)
                    .map_or(0, |(_, n)| *n);
                TASKS_BY_STATUS
                    .with_label_values(&[status.as_str()])
                    .set(count);
            }
        }
        Err(e) => warn!(error = %e, "Failed to count tasks by status"),
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    static UUID: Lazy<regex_lite::Regex> = Lazy::new(|| {
        regex_lite::Regex::new(
            r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
        )
        .unwrap()
    });
    static HASH: Lazy<regex_lite::Regex> =
        Lazy::new(|| regex_lite::Regex::new(r"[0-9a-fA-F]{40}").unwrap());
    static NUMERIC: Lazy<regex_lite::Regex> =
        Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

    let result = UUID.replace_all(path, "{id}");
    let result = HASH.replace_all(&result, "{hash}");
    let result = NUMERIC.replace_all(&result, "/{id}$1");
    result.to_string()
}
