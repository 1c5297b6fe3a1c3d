//! Metrics collection for observability

use crate::context::{ContextDecision, ContextWarning, TruncationTarget};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, register_histogram_with_registry, Counter, CounterVec,
    Histogram, HistogramVec, Opts, Registry,
};
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("Failed to initialize metrics")));

const TOKEN_BUCKETS: &[f64] = &[
    128.0, 256.0, 512.0, 1024.0, 2048.0, 3072.0, 3500.0, 4096.0, 8192.0, 16384.0,
];

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Context decision metrics
    pub context_decisions: CounterVec,
    pub context_estimated_tokens: Histogram,
    pub context_history_tokens: Histogram,
    pub context_summarizations: CounterVec,
    pub context_degraded: Counter,
    pub context_truncations: CounterVec,

    // Model metrics
    pub model_requests: CounterVec,
    pub model_request_duration: HistogramVec,

    // Conversation metrics
    pub conversations_created: Counter,
    pub conversations_deleted: Counter,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let context_decisions = register_counter_vec_with_registry!(
            Opts::new("context_decisions_total", "Total context decisions by mode"),
            &["mode"],
            registry
        )?;

        let context_estimated_tokens = register_histogram_with_registry!(
            "context_estimated_tokens",
            "Estimated tokens of the payload sent per request",
            TOKEN_BUCKETS.to_vec(),
            registry
        )?;

        let context_history_tokens = register_histogram_with_registry!(
            "context_history_tokens",
            "Estimated tokens of the full history per request",
            TOKEN_BUCKETS.to_vec(),
            registry
        )?;

        let context_summarizations = register_counter_vec_with_registry!(
            Opts::new("context_summarizations_total", "Summarization calls by outcome"),
            &["outcome"],
            registry
        )?;

        let context_degraded = register_counter_with_registry!(
            Opts::new(
                "context_degraded_total",
                "Requests that fell back to a sliding window"
            ),
            registry
        )?;

        let context_truncations = register_counter_vec_with_registry!(
            Opts::new("context_truncations_total", "Lossy truncations by target"),
            &["target"],
            registry
        )?;

        let model_requests = register_counter_vec_with_registry!(
            Opts::new("model_requests_total", "Total model generation requests"),
            &["status"],
            registry
        )?;

        let model_request_duration = register_histogram_vec_with_registry!(
            "model_request_duration_seconds",
            "Model request duration in seconds",
            &["operation"],
            registry
        )?;

        let conversations_created = register_counter_with_registry!(
            Opts::new("conversations_created_total", "Total conversations created"),
            registry
        )?;

        let conversations_deleted = register_counter_with_registry!(
            Opts::new("conversations_deleted_total", "Total conversations deleted"),
            registry
        )?;

        Ok(Self {
            registry,
            context_decisions,
            context_estimated_tokens,
            context_history_tokens,
            context_summarizations,
            context_degraded,
            context_truncations,
            model_requests,
            model_request_duration,
            conversations_created,
            conversations_deleted,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a finished context decision
    pub fn record_decision(&self, decision: &ContextDecision) {
        self.context_decisions
            .with_label_values(&[decision.mode.as_str()])
            .inc();
        self.context_estimated_tokens
            .observe(decision.estimated_tokens as f64);
        self.context_history_tokens
            .observe(decision.history_tokens as f64);

        if decision.degraded {
            self.context_degraded.inc();
        }

        for warning in &decision.warnings {
            if let ContextWarning::Truncated { target, .. } = warning {
                let target = match target {
                    TruncationTarget::LatestTurn => "latest_turn",
                    TruncationTarget::Summary => "summary",
                };
                self.context_truncations.with_label_values(&[target]).inc();
            }
        }
    }

    /// Record a summarization call outcome
    pub fn record_summarization(&self, outcome: &str) {
        self.context_summarizations
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a model generation request
    pub fn record_model_request(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.model_requests.with_label_values(&[status]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Helper macro to time operations
#[macro_export]
macro_rules! time_operation {
    ($histogram:expr, $label:expr, $operation:expr) => {{
        let timer = $histogram.with_label_values(&[$label]).start_timer();
        let result = $operation;
        timer.observe_duration();
        result
    }};
}
