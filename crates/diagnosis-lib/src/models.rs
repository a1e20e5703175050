//! Core data models for the diagnosis engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable disease identifier shared by the classifiers' label space and the
/// metadata table
pub type DiseaseId = u32;

/// Per-classifier probability distribution over diseases.
///
/// Ordered by disease id so iteration is deterministic.
pub type ClassifierOutput = BTreeMap<DiseaseId, f64>;

/// Recognised symptom, one per training column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symptom {
    pub id: usize,
    pub name: String,
    pub code: String,
}

/// Disease metadata row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disease {
    pub id: DiseaseId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub precautions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_actions: Option<Vec<String>>,
}

/// Binary feature vector, one slot per registry entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    /// All-zero vector of the given length
    pub fn zeros(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
        }
    }

    /// Mark the slot at `index` as present. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = 1.0;
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Number of slots set to 1
    pub fn active_count(&self) -> usize {
        self.values.iter().filter(|v| **v > 0.0).count()
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self { values }
    }
}

/// Ensemble result for a single disease before metadata is attached
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDisease {
    pub disease_id: DiseaseId,
    /// Mean probability over surviving voters, in [0, 1]
    pub probability: f64,
    /// Surviving classifiers whose top label was this disease
    pub votes: usize,
}

/// One entry of the final response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPrediction {
    pub id: DiseaseId,
    pub disease: String,
    pub description: String,
    pub precautions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_actions: Option<Vec<String>>,
    /// Percentage with two decimals, e.g. "64.55%"
    pub probability: String,
    pub votes: usize,
}

/// Non-fatal conditions attached to a successful response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionWarning {
    /// Input codes absent from the registry
    UnrecognizedSymptoms { codes: Vec<String> },
    /// Classifiers whose vote was dropped for this request
    PartialVoteLoss { dropped: Vec<String> },
    /// Predicted diseases with no metadata row, removed from the response
    MetadataInconsistency { disease_ids: Vec<DiseaseId> },
}

/// Final response of the prediction service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Vec<RankedPrediction>,
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<PredictionWarning>,
    pub unrecognized_symptoms: usize,
}

impl PredictionResponse {
    pub fn has_warning(&self, predicate: impl Fn(&PredictionWarning) -> bool) -> bool {
        self.warnings.iter().any(predicate)
    }

    pub fn has_partial_vote_loss(&self) -> bool {
        self.has_warning(|w| matches!(w, PredictionWarning::PartialVoteLoss { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_vector_set_ignores_out_of_range() {
        let mut v = FeatureVector::zeros(3);
        v.set(1);
        v.set(7);
        assert_eq!(v.as_slice(), &[0.0, 1.0, 0.0]);
        assert_eq!(v.active_count(), 1);
    }

    #[test]
    fn test_warning_serializes_with_kind_tag() {
        let w = PredictionWarning::PartialVoteLoss {
            dropped: vec!["decision_tree".to_string()],
        };
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["kind"], "partial_vote_loss");
        assert_eq!(json["dropped"][0], "decision_tree");
    }
}
