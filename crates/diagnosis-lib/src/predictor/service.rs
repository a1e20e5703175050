//! Prediction service
//!
//! Orchestrates encoder, classifiers, aggregator and metadata resolution for
//! one request. All state is read-only after construction, so one instance
//! is shared across concurrent requests without locking.

use super::ensemble::{EnsembleAggregator, Vote, DEFAULT_TOP_K};
use super::features::FeatureEncoder;
use super::output::ResponseAssembler;
use super::Classifier;
use crate::artifacts::{load_artifacts, ArtifactBundle};
use crate::error::{PredictionError, ScoringError, StartupError};
use crate::models::{
    ClassifierOutput, DiseaseId, FeatureVector, PredictionResponse, PredictionWarning, Symptom,
};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::registry::SymptomRegistry;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Configuration for the prediction service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Ranked diseases returned per request
    pub top_k: usize,
    /// Instance label attached to structured log events
    pub instance: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            instance: "diagnosis".to_string(),
        }
    }
}

pub struct PredictionService {
    registry: Arc<SymptomRegistry>,
    encoder: FeatureEncoder,
    classifiers: Vec<Arc<dyn Classifier>>,
    aggregator: EnsembleAggregator,
    assembler: ResponseAssembler,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl PredictionService {
    /// Build from an already validated bundle
    pub fn new(bundle: ArtifactBundle, config: ServiceConfig) -> Result<Self, StartupError> {
        if bundle.classifiers.is_empty() {
            return Err(StartupError::EmptyEnsemble);
        }
        let encoder = FeatureEncoder::new(bundle.registry.clone());
        for classifier in &bundle.classifiers {
            if classifier.n_features() != encoder.dimension() {
                return Err(StartupError::invalid_model(
                    classifier.name(),
                    format!(
                        "model expects {} features, encoder produces {}",
                        classifier.n_features(),
                        encoder.dimension()
                    ),
                ));
            }
        }

        let metrics = EngineMetrics::new();
        metrics.set_ensemble_info(bundle.registry.schema_id(), bundle.classifiers.len());

        Ok(Self {
            encoder,
            registry: bundle.registry,
            classifiers: bundle.classifiers,
            aggregator: EnsembleAggregator::with_top_k(config.top_k),
            assembler: ResponseAssembler::new(bundle.catalog),
            metrics,
            logger: StructuredLogger::new(config.instance),
        })
    }

    /// Load every artifact in `dir` and build the service
    pub fn from_artifacts(dir: &Path, config: ServiceConfig) -> Result<Self, StartupError> {
        let service = Self::new(load_artifacts(dir)?, config)?;
        service.logger.log_startup(
            env!("CARGO_PKG_VERSION"),
            service.schema_id(),
            service.registry.len(),
            &service.classifier_names(),
        );
        Ok(service)
    }

    pub fn list_symptoms(&self) -> &[Symptom] {
        self.registry.all_symptoms()
    }

    pub fn schema_id(&self) -> &str {
        self.registry.schema_id()
    }

    pub fn classifier_names(&self) -> Vec<&str> {
        self.classifiers.iter().map(|c| c.name()).collect()
    }

    /// Predict the most likely diseases for a set of reported symptom codes
    pub fn predict<I, S>(&self, codes: I) -> Result<PredictionResponse, PredictionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let start = Instant::now();
        let codes: Vec<S> = codes.into_iter().collect();
        if codes.is_empty() {
            self.metrics.inc_invalid_input();
            return Err(PredictionError::InvalidInput(
                "no symptoms reported".to_string(),
            ));
        }

        let encoded = self.encoder.encode_reported(&codes);
        self.metrics.add_unrecognized_symptoms(encoded.unrecognized.len());
        if !encoded.has_recognized() {
            self.metrics.inc_invalid_input();
            return Err(PredictionError::InvalidInput(format!(
                "none of the {} reported symptoms are recognised",
                encoded.unrecognized.len()
            )));
        }

        let (votes, dropped) = self.collect_votes(&encoded.features);
        if !dropped.is_empty() {
            self.metrics.add_dropped_votes(dropped.len());
        }

        let ranked = self.aggregator.aggregate(&votes).map_err(|e| {
            self.metrics.inc_no_prediction();
            e
        })?;

        let assembled = self.assembler.assemble(&ranked);
        for &id in &assembled.missing_metadata {
            self.logger.log_metadata_inconsistency(id);
        }
        self.metrics
            .add_metadata_inconsistencies(assembled.missing_metadata.len());
        if assembled.predictions.is_empty() {
            self.metrics.inc_no_prediction();
            return Err(PredictionError::NoPredictionAvailable(
                "no ranked disease has metadata".to_string(),
            ));
        }

        let warnings = build_warnings(encoded.unrecognized, dropped, assembled.missing_metadata);
        let response = PredictionResponse {
            degraded: !warnings.is_empty(),
            unrecognized_symptoms: warnings
                .iter()
                .find_map(|w| match w {
                    PredictionWarning::UnrecognizedSymptoms { codes } => Some(codes.len()),
                    _ => None,
                })
                .unwrap_or(0),
            predictions: assembled.predictions,
            warnings,
        };

        self.metrics
            .observe_prediction_latency(start.elapsed().as_secs_f64());
        self.metrics.inc_predictions_generated();
        let top = response.predictions.first();
        self.logger.log_prediction(
            encoded.features.active_count(),
            response.unrecognized_symptoms,
            votes.len(),
            top.map(|p| p.disease.as_str()),
            top.map(|p| p.probability.as_str()),
            response.degraded,
        );

        Ok(response)
    }

    /// Score with every classifier; failures drop that vote for this request only
    fn collect_votes(&self, features: &FeatureVector) -> (Vec<Vote>, Vec<String>) {
        let mut votes = Vec::with_capacity(self.classifiers.len());
        let mut dropped = Vec::new();

        for classifier in &self.classifiers {
            match score(classifier.as_ref(), features) {
                Ok((output, label)) => {
                    debug!(classifier = %classifier.name(), label = label, "Classifier voted");
                    votes.push(Vote::new(classifier.name(), output, Some(label)));
                }
                Err(e) => {
                    self.logger.log_vote_dropped(classifier.name(), &e.to_string());
                    dropped.push(classifier.name().to_string());
                }
            }
        }

        (votes, dropped)
    }
}

fn score(
    classifier: &dyn Classifier,
    features: &FeatureVector,
) -> Result<(ClassifierOutput, DiseaseId), ScoringError> {
    catch_unwind(AssertUnwindSafe(|| {
        let output = classifier.predict_probabilities(features)?;
        let label = classifier.predict_label(features)?;
        Ok::<_, ScoringError>((output, label))
    }))
    .unwrap_or_else(|_| Err(ScoringError::InvalidOutput("classifier panicked".to_string())))
}

fn build_warnings(
    unrecognized: Vec<String>,
    dropped: Vec<String>,
    missing_metadata: Vec<DiseaseId>,
) -> Vec<PredictionWarning> {
    let mut warnings = Vec::new();
    if !unrecognized.is_empty() {
        warnings.push(PredictionWarning::UnrecognizedSymptoms {
            codes: unrecognized,
        });
    }
    if !dropped.is_empty() {
        warnings.push(PredictionWarning::PartialVoteLoss { dropped });
    }
    if !missing_metadata.is_empty() {
        warnings.push(PredictionWarning::MetadataInconsistency {
            disease_ids: missing_metadata,
        });
    }
    warnings
}
