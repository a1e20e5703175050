//! Random forest adapter
//!
//! Bagged trees sharing one label space; the forest distribution is the mean
//! of the per-tree leaf distributions.

use super::tree::TreeNodes;
use super::{check_shape, to_output, validate_header, Classifier, ClassifierKind};
use crate::artifacts::read_json;
use crate::error::{ScoringError, StartupError};
use crate::models::{ClassifierOutput, DiseaseId, FeatureVector};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RandomForestArtifact {
    schema_id: String,
    classes: Vec<DiseaseId>,
    n_features: usize,
    trees: Vec<TreeNodes>,
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    name: String,
    classes: Vec<DiseaseId>,
    n_features: usize,
    trees: Vec<TreeNodes>,
}

impl RandomForest {
    pub fn load(name: &str, path: &Path, schema_id: &str) -> Result<Self, StartupError> {
        let artifact: RandomForestArtifact = read_json(path)?;
        let artifact_name = path.display().to_string();
        validate_header(&artifact_name, &artifact.schema_id, schema_id, &artifact.classes)?;
        let model = Self::from_parts(name, artifact.classes, artifact.n_features, artifact.trees)
            .map_err(|reason| StartupError::invalid_model(&artifact_name, reason))?;
        debug!(classifier = %name, trees = model.n_trees(), "Loaded random forest model");
        Ok(model)
    }

    pub fn from_parts(
        name: impl Into<String>,
        classes: Vec<DiseaseId>,
        n_features: usize,
        trees: Vec<TreeNodes>,
    ) -> Result<Self, String> {
        if trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for (i, tree) in trees.iter().enumerate() {
            tree.validate(n_features, classes.len())
                .map_err(|reason| format!("tree {}: {}", i, reason))?;
        }
        Ok(Self {
            name: name.into(),
            classes,
            n_features,
            trees,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForest {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::RandomForest
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
        let x = features.as_slice();
        let mut totals = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (total, p) in totals.iter_mut().zip(tree.leaf_distribution(x)) {
                *total += p;
            }
        }
        let n = self.trees.len() as f64;
        let mean: Vec<f64> = totals.into_iter().map(|t| t / n).collect();
        to_output(&self.classes, &mean)
    }
}
