//! Metrics collection for observability

use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry, register_histogram_with_registry, Counter, CounterVec,
    Histogram, HistogramVec, Opts, Registry,
};
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Provider metrics
    pub provider_requests: CounterVec,
    pub provider_retries: CounterVec,
    pub provider_request_duration: HistogramVec,

    // Memory metrics
    pub summarizations: CounterVec,
    pub prompt_tokens: Histogram,
    pub sizing_rejections: CounterVec,

    // Retrieval metrics
    pub relevance_gate_rejections: Counter,
    pub chunks_indexed: Counter,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Registry::new();

        let provider_requests = register_counter_vec_with_registry!(
            Opts::new("provider_requests_total", "Total LLM provider requests"),
            &["provider", "outcome"],
            registry
        )?;

        let provider_retries = register_counter_vec_with_registry!(
            Opts::new("provider_retries_total", "Total retried provider attempts"),
            &["provider"],
            registry
        )?;

        let provider_request_duration = register_histogram_vec_with_registry!(
            "provider_request_duration_seconds",
            "LLM provider request duration in seconds, retries included",
            &["provider"],
            registry
        )?;

        let summarizations = register_counter_vec_with_registry!(
            Opts::new("summarizations_total", "Total history summarizations"),
            &["method"],
            registry
        )?;

        let prompt_tokens = register_histogram_with_registry!(
            "prompt_tokens",
            "Tokens in each assembled prompt",
            vec![250.0, 500.0, 1000.0, 2000.0, 4000.0, 6000.0, 8000.0],
            registry
        )?;

        let sizing_rejections = register_counter_vec_with_registry!(
            Opts::new("sizing_rejections_total", "Turns rejected by the token budget"),
            &["reason"],
            registry
        )?;

        let relevance_gate_rejections = register_counter_with_registry!(
            Opts::new(
                "relevance_gate_rejections_total",
                "Queries answered with the fallback sentence"
            ),
            registry
        )?;

        let chunks_indexed = register_counter_with_registry!(
            Opts::new("chunks_indexed_total", "Total chunks added to the index"),
            registry
        )?;

        Ok(Self {
            registry,
            provider_requests,
            provider_retries,
            provider_request_duration,
            summarizations,
            prompt_tokens,
            sizing_rejections,
            relevance_gate_rejections,
            chunks_indexed,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record one provider attempt
    pub fn record_provider_request(&self, provider: &str, outcome: &str) {
        self.provider_requests
            .with_label_values(&[provider, outcome])
            .inc();
    }

    pub fn record_provider_duration(&self, provider: &str, seconds: f64) {
        self.provider_request_duration
            .with_label_values(&[provider])
            .observe(seconds);
    }

    pub fn record_retry(&self, provider: &str) {
        self.provider_retries.with_label_values(&[provider]).inc();
    }

    /// Record a summarization event, `method` is "model" or "fallback"
    pub fn record_summarization(&self, method: &str) {
        self.summarizations.with_label_values(&[method]).inc();
    }

    pub fn record_prompt_tokens(&self, tokens: usize) {
        self.prompt_tokens.observe(tokens as f64);
    }

    pub fn record_sizing_rejection(&self, reason: &str) {
        self.sizing_rejections.with_label_values(&[reason]).inc();
    }

    pub fn record_gate_rejection(&self) {
        self.relevance_gate_rejections.inc();
    }

    pub fn record_chunks_indexed(&self, count: usize) {
        self.chunks_indexed.inc_by(count as f64);
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}
