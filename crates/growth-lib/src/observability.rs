//! Observability infrastructure for the prediction service
//!
//! Provides:
//! - Prometheus metrics (prediction latency, batch sizes, artifact resolutions, model state)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

const BATCH_SIZE_BUCKETS: &[f64] = &[1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServiceMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct ServiceMetricsInner {
    prediction_latency_seconds: Histogram,
    batch_size: Histogram,
    predictions_served: IntCounter,
    prediction_errors: IntCounterVec,
    artifact_resolutions: IntCounterVec,
    model_loaded: IntGauge,
    model_info: GaugeVec,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "growth_api_prediction_latency_seconds",
                "Time spent running classifier inference",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            batch_size: register_histogram!(
                "growth_api_batch_size",
                "Number of instances per inference call",
                BATCH_SIZE_BUCKETS.to_vec()
            )
            .expect("Failed to register batch_size"),

            predictions_served: register_int_counter!(
                "growth_api_predictions_total",
                "Total number of instances classified"
            )
            .expect("Failed to register predictions_total"),

            prediction_errors: register_int_counter_vec!(
                "growth_api_prediction_errors_total",
                "Prediction requests that failed, by error kind",
                &["kind"]
            )
            .expect("Failed to register prediction_errors_total"),

            artifact_resolutions: register_int_counter_vec!(
                "growth_api_artifact_resolutions_total",
                "Artifact resolutions by artifact and outcome",
                &["artifact", "outcome"]
            )
            .expect("Failed to register artifact_resolutions_total"),

            model_loaded: register_int_gauge!(
                "growth_api_model_loaded",
                "1 when a classifier is loaded and serving"
            )
            .expect("Failed to register model_loaded"),

            model_info: register_gauge_vec!(
                "growth_api_model_info",
                "Information about the currently loaded classifier",
                &["model_type", "source"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Service metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ServiceMetrics {
    _private: (),
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServiceMetricsInner {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new)
    }

    /// Record one inference call over `batch_size` rows
    pub fn observe_inference(&self, duration_secs: f64, batch_size: usize) {
        let inner = self.inner();
        inner.prediction_latency_seconds.observe(duration_secs);
        inner.batch_size.observe(batch_size as f64);
        inner.predictions_served.inc_by(batch_size as u64);
    }

    pub fn inc_prediction_errors(&self, kind: &str) {
        self.inner().prediction_errors.with_label_values(&[kind]).inc();
    }

    pub fn inc_artifact_resolution(&self, artifact: &str, outcome: &str) {
        self.inner()
            .artifact_resolutions
            .with_label_values(&[artifact, outcome])
            .inc();
    }

    /// Mark the classifier as loaded
    pub fn set_model_loaded(&self, model_type: &str, source: &str) {
        let inner = self.inner();
        inner.model_loaded.set(1);
        inner.model_info.reset();
        inner
            .model_info
            .with_label_values(&[model_type, source])
            .set(1.0);
    }
}

/// Structured logger for service events
///
/// Provides consistent JSON-formatted logging for artifact resolution,
/// model loading and predictions.
#[derive(Clone)]
pub struct StructuredLogger {
    service_name: String,
}

impl StructuredLogger {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, port: u16) {
        info!(
            event = "service_started",
            service = %self.service_name,
            version = %version,
            port = port,
            "Growth potential API started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service_name,
            reason = %reason,
            "Growth potential API shutting down"
        );
    }

    /// Log where an artifact was resolved from
    pub fn log_artifact_resolved(&self, name: &str, source: &str, path: &str) {
        if source == "stale_cache" {
            warn!(
                event = "artifact_resolved",
                service = %self.service_name,
                artifact = %name,
                source = %source,
                path = %path,
                "Serving artifact from stale cache"
            );
        } else {
            info!(
                event = "artifact_resolved",
                service = %self.service_name,
                artifact = %name,
                source = %source,
                path = %path,
                "Artifact resolved"
            );
        }
    }

    /// Log a successful classifier load
    pub fn log_model_loaded(&self, model_type: &str, source: &str, checksum: &str) {
        info!(
            event = "model_loaded",
            service = %self.service_name,
            model_type = %model_type,
            source = %source,
            checksum = %checksum,
            "Classifier loaded"
        );
    }

    /// Log that no classifier could be produced
    pub fn log_model_unavailable(&self, reason: &str) {
        warn!(
            event = "model_unavailable",
            service = %self.service_name,
            reason = %reason,
            "Classifier unavailable, prediction endpoints will return 503"
        );
    }

    /// Log a served prediction request
    pub fn log_prediction(&self, instances: usize, elapsed_us: u64) {
        info!(
            event = "prediction_served",
            service = %self.service_name,
            instances = instances,
            elapsed_us = elapsed_us,
            "Prediction served"
        );
    }
}
