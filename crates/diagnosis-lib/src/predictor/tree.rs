//! Decision tree adapter
//!
//! Trees are stored in flattened node-array form: node `i` is a leaf when
//! `children_left[i] == -1`, otherwise traversal goes left when
//! `x[feature[i]] <= threshold[i]`. Leaf `value` rows hold per-class counts.

use super::{check_shape, to_output, validate_header, Classifier, ClassifierKind};
use crate::artifacts::read_json;
use crate::error::{ScoringError, StartupError};
use crate::models::{ClassifierOutput, DiseaseId, FeatureVector};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

const LEAF: i64 = -1;

/// Flattened tree structure shared by the tree and forest artifacts
#[derive(Debug, Clone, Deserialize)]
pub struct TreeNodes {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Vec<Vec<f64>>,
}

impl TreeNodes {
    /// Check structure against the model's input width and class count.
    ///
    /// Children must have a larger index than their parent, which rules out
    /// cycles.
    pub fn validate(&self, n_features: usize, n_classes: usize) -> Result<(), String> {
        let n = self.children_left.len();
        if n == 0 {
            return Err("tree has no nodes".to_string());
        }
        if self.children_right.len() != n
            || self.feature.len() != n
            || self.threshold.len() != n
            || self.value.len() != n
        {
            return Err("node arrays differ in length".to_string());
        }

        for node in 0..n {
            let (left, right) = (self.children_left[node], self.children_right[node]);
            if left == LEAF {
                if right != LEAF {
                    return Err(format!("node {} has only one child", node));
                }
                let row = &self.value[node];
                if row.len() != n_classes {
                    return Err(format!(
                        "leaf {} has {} class counts, expected {}",
                        node,
                        row.len(),
                        n_classes
                    ));
                }
                if row.iter().any(|v| !(v.is_finite() && *v >= 0.0)) || row.iter().sum::<f64>() <= 0.0 {
                    return Err(format!("leaf {} has no usable class counts", node));
                }
                continue;
            }
            for child in [left, right] {
                if child <= node as i64 || child >= n as i64 {
                    return Err(format!("node {} has invalid child {}", node, child));
                }
            }
            let feature = self.feature[node];
            if feature < 0 || feature as usize >= n_features {
                return Err(format!("node {} splits on unknown feature {}", node, feature));
            }
            if !self.threshold[node].is_finite() {
                return Err(format!("node {} has a non-finite threshold", node));
            }
        }
        Ok(())
    }

    /// Normalised class distribution of the leaf reached by `x`
    pub fn leaf_distribution(&self, x: &[f64]) -> Vec<f64> {
        let mut node = 0usize;
        while self.children_left[node] != LEAF {
            let value = x[self.feature[node] as usize];
            node = if value <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        let counts = &self.value[node];
        let total: f64 = counts.iter().sum();
        counts.iter().map(|c| c / total).collect()
    }
}

#[derive(Debug, Deserialize)]
struct DecisionTreeArtifact {
    schema_id: String,
    classes: Vec<DiseaseId>,
    n_features: usize,
    tree: TreeNodes,
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    name: String,
    classes: Vec<DiseaseId>,
    n_features: usize,
    nodes: TreeNodes,
}

impl DecisionTree {
    pub fn load(name: &str, path: &Path, schema_id: &str) -> Result<Self, StartupError> {
        let artifact: DecisionTreeArtifact = read_json(path)?;
        let artifact_name = path.display().to_string();
        validate_header(&artifact_name, &artifact.schema_id, schema_id, &artifact.classes)?;
        let model = Self::from_parts(name, artifact.classes, artifact.n_features, artifact.tree)
            .map_err(|reason| StartupError::invalid_model(&artifact_name, reason))?;
        debug!(
            classifier = %name,
            nodes = model.nodes.children_left.len(),
            "Loaded decision tree model"
        );
        Ok(model)
    }

    pub fn from_parts(
        name: impl Into<String>,
        classes: Vec<DiseaseId>,
        n_features: usize,
        nodes: TreeNodes,
    ) -> Result<Self, String> {
        nodes.validate(n_features, classes.len())?;
        Ok(Self {
            name: name.into(),
            classes,
            n_features,
            nodes,
        })
    }
}

impl Classifier for DecisionTree {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ClassifierKind {
        ClassifierKind::DecisionTree
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
        to_output(&self.classes, &self.nodes.leaf_distribution(features.as_slice()))
    }
}
