//! Observability infrastructure for the diagnosis engine
//!
//! Provides:
//! - Prometheus metrics (prediction latency, request outcomes, ensemble info)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, GaugeVec, Histogram, IntCounter,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    prediction_latency_seconds: Histogram,
    predictions_generated: IntCounter,
    invalid_input: IntCounter,
    no_prediction: IntCounter,
    dropped_votes: IntCounter,
    unrecognized_symptoms: IntCounter,
    metadata_inconsistencies: IntCounter,
    ensemble_info: GaugeVec,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "diagnosis_prediction_latency_seconds",
                "Time spent encoding, scoring and ranking one request",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_generated: register_int_counter!(
                "diagnosis_predictions_generated_total",
                "Total number of successful predictions"
            )
            .expect("Failed to register predictions_generated"),

            invalid_input: register_int_counter!(
                "diagnosis_invalid_input_total",
                "Requests rejected for empty or unrecognised symptom sets"
            )
            .expect("Failed to register invalid_input"),

            no_prediction: register_int_counter!(
                "diagnosis_no_prediction_total",
                "Requests where no classifier produced a usable result"
            )
            .expect("Failed to register no_prediction"),

            dropped_votes: register_int_counter!(
                "diagnosis_dropped_votes_total",
                "Classifier votes dropped because scoring failed"
            )
            .expect("Failed to register dropped_votes"),

            unrecognized_symptoms: register_int_counter!(
                "diagnosis_unrecognized_symptoms_total",
                "Reported symptom codes absent from the registry"
            )
            .expect("Failed to register unrecognized_symptoms"),

            metadata_inconsistencies: register_int_counter!(
                "diagnosis_metadata_inconsistencies_total",
                "Predicted diseases dropped for lack of metadata"
            )
            .expect("Failed to register metadata_inconsistencies"),

            ensemble_info: register_gauge_vec!(
                "diagnosis_ensemble_info",
                "Information about the loaded ensemble",
                &["schema_id", "classifiers"]
            )
            .expect("Failed to register ensemble_info"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions_generated(&self) {
        self.inner().predictions_generated.inc();
    }

    pub fn inc_invalid_input(&self) {
        self.inner().invalid_input.inc();
    }

    pub fn inc_no_prediction(&self) {
        self.inner().no_prediction.inc();
    }

    pub fn add_dropped_votes(&self, count: usize) {
        self.inner().dropped_votes.inc_by(count as u64);
    }

    pub fn add_unrecognized_symptoms(&self, count: usize) {
        self.inner().unrecognized_symptoms.inc_by(count as u64);
    }

    pub fn add_metadata_inconsistencies(&self, count: usize) {
        self.inner().metadata_inconsistencies.inc_by(count as u64);
    }

    pub fn set_ensemble_info(&self, schema_id: &str, classifiers: usize) {
        let classifiers = classifiers.to_string();
        self.inner().ensemble_info.reset();
        self.inner()
            .ensemble_info
            .with_label_values(&[schema_id, classifiers.as_str()])
            .set(1.0);
    }
}

/// Structured logger for engine events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, version: &str, schema_id: &str, symptoms: usize, classifiers: &[&str]) {
        info!(
            event = "engine_started",
            instance = %self.instance,
            version = %version,
            schema_id = %schema_id,
            symptoms = symptoms,
            classifiers = ?classifiers,
            "Diagnosis engine started"
        );
    }

    pub fn log_startup_failure(&self, reason: &str) {
        error!(
            event = "engine_start_failed",
            instance = %self.instance,
            reason = %reason,
            "Diagnosis engine failed to load artifacts"
        );
    }

    pub fn log_prediction(
        &self,
        recognized: usize,
        unrecognized: usize,
        voters: usize,
        top_disease: Option<&str>,
        top_probability: Option<&str>,
        degraded: bool,
    ) {
        info!(
            event = "prediction_generated",
            instance = %self.instance,
            recognized = recognized,
            unrecognized = unrecognized,
            voters = voters,
            top_disease = ?top_disease,
            top_probability = ?top_probability,
            degraded = degraded,
            "Generated disease prediction"
        );
    }

    pub fn log_vote_dropped(&self, classifier: &str, reason: &str) {
        warn!(
            event = "vote_dropped",
            instance = %self.instance,
            classifier = %classifier,
            reason = %reason,
            "Classifier failed during scoring, continuing with remaining voters"
        );
    }

    /// Label space and metadata table disagree; loud on purpose
    pub fn log_metadata_inconsistency(&self, disease_id: u32) {
        error!(
            event = "metadata_inconsistency",
            instance = %self.instance,
            disease_id = disease_id,
            "Predicted disease has no metadata entry, dropping it from the response"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Diagnosis engine shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_metrics_handles_share_registry() {
        let metrics = EngineMetrics::new();
        let clone = metrics.clone();

        metrics.observe_prediction_latency(0.0002);
        metrics.inc_predictions_generated();
        clone.add_dropped_votes(2);
        clone.add_unrecognized_symptoms(1);
        metrics.set_ensemble_info("abc", 3);

        // second handle must not re-register
        let _again = EngineMetrics::new();
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-instance");
        assert_eq!(logger.instance, "test-instance");
    }
}
