//! Prometheus metrics for monitoring the gateway.
//!
//! This module provides a centralized metrics registry for request counts,
//! latency, recovered tool calls and the health of upstream streams.

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_counter, register_int_counter_vec,
    GaugeVec, HistogramVec, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;

/// Container for all application metrics.
pub struct Metrics {
    /// Total number of requests by method, endpoint, model and status
    pub request_count: IntCounterVec,

    /// Request duration histogram in seconds
    pub request_duration: HistogramVec,

    /// Number of currently active requests by endpoint
    pub active_requests: GaugeVec,

    /// Total token usage reported by the upstream, by model and token type
    pub token_usage: IntCounterVec,

    /// Tool calls recovered from upstream text, by delivery mode
    pub tool_calls: IntCounterVec,

    /// Upstream SSE frames dropped because their payload was not valid JSON
    pub sse_frames_skipped: IntCounter,

    /// Upstream failures by kind (status, transport)
    pub upstream_errors: IntCounterVec,

    /// Streaming responses by how they ended
    pub stream_outcomes: IntCounterVec,

    /// Time to first byte from the upstream for streaming requests
    pub ttft: HistogramVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Initialize the metrics registry.
///
/// This should be called once at application startup. Subsequent calls will
/// return the same instance.
///
/// # Examples
///
/// ```no_run
/// use toolify_gateway::core::metrics::init_metrics;
///
/// let metrics = init_metrics();
/// metrics.request_count.with_label_values(&["GET", "/health", "none", "200"]).inc();
/// ```
pub fn init_metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let request_count = register_int_counter_vec!(
            "toolify_requests_total",
            "Total number of requests",
            &["method", "endpoint", "model", "status_code"]
        )
        .expect("Failed to register request_count metric");

        let request_duration = register_histogram_vec!(
            "toolify_request_duration_seconds",
            "Request duration in seconds",
            &["method", "endpoint", "model"],
            vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]
        )
        .expect("Failed to register request_duration metric");

        let active_requests = register_gauge_vec!(
            "toolify_active_requests",
            "Number of active requests",
            &["endpoint"]
        )
        .expect("Failed to register active_requests metric");

        let token_usage = register_int_counter_vec!(
            "toolify_tokens_total",
            "Total number of tokens reported by the upstream",
            &["model", "token_type"]
        )
        .expect("Failed to register token_usage metric");

        let tool_calls = register_int_counter_vec!(
            "toolify_tool_calls_total",
            "Tool calls recovered from upstream text",
            &["mode"]
        )
        .expect("Failed to register tool_calls metric");

        let sse_frames_skipped = register_int_counter!(
            "toolify_sse_frames_skipped_total",
            "Upstream SSE frames skipped because of malformed JSON"
        )
        .expect("Failed to register sse_frames_skipped metric");

        let upstream_errors = register_int_counter_vec!(
            "toolify_upstream_errors_total",
            "Upstream failures by kind",
            &["kind"]
        )
        .expect("Failed to register upstream_errors metric");

        let stream_outcomes = register_int_counter_vec!(
            "toolify_stream_outcomes_total",
            "Streaming responses by outcome",
            &["outcome"]
        )
        .expect("Failed to register stream_outcomes metric");

        let ttft = register_histogram_vec!(
            "toolify_ttft_seconds",
            "Time to first upstream chunk in seconds for streaming requests",
            &["model"],
            vec![0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0]
        )
        .expect("Failed to register ttft metric");

        Metrics {
            request_count,
            request_duration,
            active_requests,
            token_usage,
            tool_calls,
            sse_frames_skipped,
            upstream_errors,
            stream_outcomes,
            ttft,
        }
    })
}

/// Get the global metrics instance, registering it on first use.
pub fn get_metrics() -> &'static Metrics {
    init_metrics()
}
