//! Prediction engine
//!
//! Encoder, classifier adapters, ensemble aggregation and the orchestrating
//! service.

mod ensemble;
mod features;
mod forest;
mod naive_bayes;
mod output;
mod service;
mod tree;

pub use ensemble::{EnsembleAggregator, Vote, DEFAULT_TOP_K};
pub use features::{EncodedSymptoms, FeatureEncoder};
pub use forest::RandomForest;
pub use naive_bayes::GaussianNaiveBayes;
pub use output::{format_probability, AssembledPredictions, ResponseAssembler};
pub use service::{PredictionService, ServiceConfig};
pub use tree::{DecisionTree, TreeNodes};

use crate::error::{ScoringError, StartupError};
use crate::models::{ClassifierOutput, DiseaseId, FeatureVector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Algorithm backing a classifier slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    GaussianNaiveBayes,
    DecisionTree,
    RandomForest,
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GaussianNaiveBayes => "gaussian_naive_bayes",
            Self::DecisionTree => "decision_tree",
            Self::RandomForest => "random_forest",
        };
        f.write_str(name)
    }
}

/// Anything that can score a feature vector.
///
/// Implementations normalise their native output into a disease id to
/// probability mapping so the aggregator never branches on algorithm.
pub trait Classifier: Send + Sync {
    /// Ensemble member name, unique within an ensemble
    fn name(&self) -> &str;

    fn kind(&self) -> ClassifierKind;

    /// Disease ids of the label space, in model column order
    fn classes(&self) -> &[DiseaseId];

    /// Expected feature vector length
    fn n_features(&self) -> usize;

    fn predict_probabilities(&self, features: &FeatureVector)
        -> Result<ClassifierOutput, ScoringError>;

    /// Single most likely disease; ties go to the lower id
    fn predict_label(&self, features: &FeatureVector) -> Result<DiseaseId, ScoringError> {
        let output = self.predict_probabilities(features)?;
        output
            .iter()
            .fold(None::<(DiseaseId, f64)>, |best, (&id, &p)| match best {
                Some((_, best_p)) if best_p >= p => best,
                _ => Some((id, p)),
            })
            .map(|(id, _)| id)
            .ok_or_else(|| ScoringError::InvalidOutput("empty distribution".to_string()))
    }
}

/// Load one classifier artifact of the given kind
pub fn load_classifier(
    name: &str,
    kind: ClassifierKind,
    path: &Path,
    schema_id: &str,
) -> Result<Arc<dyn Classifier>, StartupError> {
    let classifier: Arc<dyn Classifier> = match kind {
        ClassifierKind::GaussianNaiveBayes => {
            Arc::new(GaussianNaiveBayes::load(name, path, schema_id)?)
        }
        ClassifierKind::DecisionTree => Arc::new(DecisionTree::load(name, path, schema_id)?),
        ClassifierKind::RandomForest => Arc::new(RandomForest::load(name, path, schema_id)?),
    };
    Ok(classifier)
}

/// Check a feature vector against the model's input width
pub(crate) fn check_shape(features: &FeatureVector, expected: usize) -> Result<(), ScoringError> {
    if features.len() != expected {
        return Err(ScoringError::ShapeMismatch {
            expected,
            actual: features.len(),
        });
    }
    Ok(())
}

/// Zip class ids with a probability row, rejecting non-finite values
pub(crate) fn to_output(classes: &[DiseaseId], probabilities: &[f64]) -> Result<ClassifierOutput, ScoringError> {
    if classes.len() != probabilities.len() {
        return Err(ScoringError::InvalidOutput(format!(
            "{} probabilities for {} classes",
            probabilities.len(),
            classes.len()
        )));
    }
    classes
        .iter()
        .zip(probabilities)
        .map(|(&id, &p)| {
            if p.is_finite() {
                Ok((id, p.clamp(0.0, 1.0)))
            } else {
                Err(ScoringError::InvalidOutput(format!(
                    "non-finite probability for disease {}",
                    id
                )))
            }
        })
        .collect()
}

/// Shared checks on an artifact's declared label space and schema
pub(crate) fn validate_header(
    artifact: &str,
    declared_schema: &str,
    expected_schema: &str,
    classes: &[DiseaseId],
) -> Result<(), StartupError> {
    if declared_schema != expected_schema {
        return Err(StartupError::SchemaMismatch {
            artifact: artifact.to_string(),
            expected: expected_schema.to_string(),
            found: declared_schema.to_string(),
        });
    }
    if classes.is_empty() {
        return Err(StartupError::invalid_model(artifact, "no classes"));
    }
    let mut sorted = classes.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() != classes.len() {
        return Err(StartupError::invalid_model(artifact, "duplicate class ids"));
    }
    Ok(())
}
