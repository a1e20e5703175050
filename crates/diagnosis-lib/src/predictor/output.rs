//! Prediction output formatting
//!
//! Attaches disease metadata to ranked ensemble scores and renders
//! probabilities for the external response.

use crate::metadata::DiseaseCatalog;
use crate::models::{DiseaseId, RankedPrediction, ScoredDisease};
use std::sync::Arc;

/// Render a probability in [0, 1] as a percentage with two decimals
pub fn format_probability(probability: f64) -> String {
    format!("{:.2}%", probability.clamp(0.0, 1.0) * 100.0)
}

/// Ranked entries with metadata, plus the ids that had none
#[derive(Debug, Clone, Default)]
pub struct AssembledPredictions {
    pub predictions: Vec<RankedPrediction>,
    pub missing_metadata: Vec<DiseaseId>,
}

/// Resolves metadata for ranked diseases
#[derive(Debug, Clone)]
pub struct ResponseAssembler {
    catalog: Arc<DiseaseCatalog>,
}

impl ResponseAssembler {
    pub fn new(catalog: Arc<DiseaseCatalog>) -> Self {
        Self { catalog }
    }

    /// Entries without metadata are dropped rather than returned half-populated
    pub fn assemble(&self, ranked: &[ScoredDisease]) -> AssembledPredictions {
        let mut out = AssembledPredictions::default();
        for scored in ranked {
            match self.catalog.resolve(scored.disease_id) {
                Ok(disease) => out.predictions.push(RankedPrediction {
                    id: disease.id,
                    disease: disease.name.clone(),
                    description: disease.description.clone(),
                    precautions: disease.precautions.clone(),
                    recommended_actions: disease.recommended_actions.clone(),
                    probability: format_probability(scored.probability),
                    votes: scored.votes,
                }),
                Err(_) => out.missing_metadata.push(scored.disease_id),
            }
        }
        out
    }
}
