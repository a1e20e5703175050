//! Gaussian Naive Bayes adapter
//!
//! Scores a feature vector from per-class feature means and variances, the
//! same parameters a trained Gaussian NB model exports.

use super::{check_shape, to_output, validate_header, Classifier, ClassifierKind};
use crate::artifacts::read_json;
use crate::error::{ScoringError, StartupError};
use crate::models::{ClassifierOutput, DiseaseId, FeatureVector};
use serde::Deserialize;
use std::f64::consts::PI;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct NaiveBayesArtifact {
    schema_id: String,
    classes: Vec<DiseaseId>,
    class_prior: Vec<f64>,
    theta: Vec<Vec<f64>>,
    var: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct GaussianNaiveBayes {
    name: String,
    classes: Vec<DiseaseId>,
    log_prior: Vec<f64>,
    theta: Vec<Vec<f64>>,
    var: Vec<Vec<f64>>,
    /// -0.5 * sum(ln(2 pi var)) per class, precomputed
    log_norm: Vec<f64>,
    n_features: usize,
}

impl GaussianNaiveBayes {
    pub fn load(name: &str, path: &Path, schema_id: &str) -> Result<Self, StartupError> {
        let artifact: NaiveBayesArtifact = read_json(path)?;
        let artifact_name = path.display().to_string();
        validate_header(&artifact_name, &artifact.schema_id, schema_id, &artifact.classes)?;
        let model = Self::from_parts(
            name,
            artifact.classes,
            artifact.class_prior,
            artifact.theta,
            artifact.var,
        )
        .map_err(|reason| StartupError::invalid_model(&artifact_name, reason))?;
        debug!(
            classifier = %name,
            classes = model.classes.len(),
            features = model.n_features,
            "Loaded naive bayes model"
        );
        Ok(model)
    }

    /// Build from raw parameters, validating shapes
    pub fn from_parts(
        name: impl Into<String>,
        classes: Vec<DiseaseId>,
        class_prior: Vec<f64>,
        theta: Vec<Vec<f64>>,
        var: Vec<Vec<f64>>,
    ) -> Result<Self, String> {
        let n_classes = classes.len();
        if class_prior.len() != n_classes || theta.len() != n_classes || var.len() != n_classes {
            return Err(format!(
                "expected {} rows in class_prior, theta and var",
                n_classes
            ));
        }
        let n_features = theta.first().map(Vec::len).unwrap_or(0);
        if n_features == 0 {
            return Err("model has no features".to_string());
        }
        if theta.iter().chain(var.iter()).any(|row| row.len() != n_features) {
            return Err(format!("every theta/var row must have {} entries", n_features));
        }
        if class_prior.iter().any(|p| !(p.is_finite() && *p > 0.0)) {
            return Err("class priors must be positive".to_string());
        }
        if var.iter().flatten().any(|v| !(v.is_finite() && *v > 0.0)) {
            return Err("variances must be positive".to_string());
        }

        let log_prior = class_prior.iter().map(|p| p.ln()).collect();
        let log_norm = var
            .iter()
            .map(|row| -0.5 * row.iter().map(|v| (2.0 * PI * v).ln()).sum::<f64>())
            .collect();

        Ok(Self {
            name: name.into(),
            classes,
            log_prior,
            theta,
            var,
            log_norm,
            n_features,
        })
    }

    fn joint_log_likelihood(&self, x: &[f64]) -> Vec<f64> {
        (0..self.classes.len())
            .map(|c| {
                let sq: f64 = x
                    .iter()
                    .zip(&self.theta[c])
                    .zip(&self.var[c])
                    .map(|((xi, mu), var)| (xi - mu).powi(2) / var)
                    .sum();
                self.log_prior[c] + self.log_norm[c] - 0.5 * sq
            })
            .collect()
    }
}

impl Classifier for GaussianNaiveBayes {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::GaussianNaiveBayes
    }

    fn classes(&self) -> &[DiseaseId] {
        &self.classes
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_probabilities(
        &self,
        features: &FeatureVector,
    ) -> Result<ClassifierOutput, ScoringError> {
        check_shape(features, self.n_features)?;
        let jll = self.joint_log_likelihood(features.as_slice());
        to_output(&self.classes, &softmax(&jll))
    }
}

/// Normalise log-likelihoods into probabilities via log-sum-exp
fn softmax(log_values: &[f64]) -> Vec<f64> {
    let max = log_values
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return vec![f64::NAN; log_values.len()];
    }
    let sum: f64 = log_values.iter().map(|v| (v - max).exp()).sum();
    let log_sum = max + sum.ln();
    log_values.iter().map(|v| (v - log_sum).exp()).collect()
}
