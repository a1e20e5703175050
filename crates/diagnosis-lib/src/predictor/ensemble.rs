//! Ensemble aggregation
//!
//! Combines the distributions of the classifiers that voted on a request into
//! one ranked list. Every surviving voter carries equal weight: a disease's
//! score is the mean of its probability over the voters, with a voter that
//! does not know the disease contributing zero.

use crate::error::PredictionError;
use crate::models::{ClassifierOutput, DiseaseId, ScoredDisease};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Number of ranked diseases returned to callers
pub const DEFAULT_TOP_K: usize = 3;

/// One classifier's contribution to a request
#[derive(Debug, Clone)]
pub struct Vote {
    pub classifier: String,
    pub output: ClassifierOutput,
    /// The classifier's own top label, if it produced one
    pub label: Option<DiseaseId>,
}

impl Vote {
    pub fn new(classifier: impl Into<String>, output: ClassifierOutput, label: Option<DiseaseId>) -> Self {
        Self {
            classifier: classifier.into(),
            output,
            label,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnsembleAggregator {
    top_k: usize,
}

impl Default for EnsembleAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl EnsembleAggregator {
    pub fn new() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(top_k: usize) -> Self {
        Self {
            top_k: top_k.max(1),
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Rank diseases by mean probability, highest first, ties to the lower id
    pub fn aggregate(&self, votes: &[Vote]) -> Result<Vec<ScoredDisease>, PredictionError> {
        if votes.is_empty() {
            return Err(PredictionError::NoPredictionAvailable(
                "no classifier produced a vote".to_string(),
            ));
        }

        let mut sums: BTreeMap<DiseaseId, f64> = BTreeMap::new();
        for vote in votes {
            for (&id, &p) in &vote.output {
                *sums.entry(id).or_insert(0.0) += p;
            }
        }
        if sums.is_empty() {
            return Err(PredictionError::NoPredictionAvailable(
                "classifiers returned empty distributions".to_string(),
            ));
        }

        let voters = votes.len() as f64;
        let mut ranked: Vec<ScoredDisease> = sums
            .into_iter()
            .map(|(disease_id, sum)| ScoredDisease {
                disease_id,
                probability: sum / voters,
                votes: votes.iter().filter(|v| v.label == Some(disease_id)).count(),
            })
            .collect();

        ranked.sort_by(rank_order);
        ranked.truncate(self.top_k);

        if let Some(top) = ranked.first() {
            if top.votes < votes.len() {
                debug!(
                    top_disease = top.disease_id,
                    agreeing = top.votes,
                    voters = votes.len(),
                    "Classifiers disagree on top label"
                );
            }
        }

        Ok(ranked)
    }
}

fn rank_order(a: &ScoredDisease, b: &ScoredDisease) -> Ordering {
    b.probability
        .total_cmp(&a.probability)
        .then_with(|| a.disease_id.cmp(&b.disease_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(name: &str, pairs: &[(DiseaseId, f64)]) -> Vote {
        let output: ClassifierOutput = pairs.iter().copied().collect();
        let label = pairs
            .iter()
            .copied()
            .fold(None::<(DiseaseId, f64)>, |best, (id, p)| match best {
                Some((bid, bp)) if bp > p || (bp == p && bid < id) => best,
                _ => Some((id, p)),
            })
            .map(|(id, _)| id);
        Vote::new(name, output, label)
    }

    #[test]
    fn test_mean_over_voters() {
        let agg = EnsembleAggregator::new();
        let ranked = agg
            .aggregate(&[
                vote("a", &[(1, 0.6), (2, 0.4)]),
                vote("b", &[(1, 0.2), (2, 0.8)]),
            ])
            .unwrap();
        assert_eq!(ranked[0].disease_id, 2);
        assert!((ranked[0].probability - 0.6).abs() < 1e-12);
        assert!((ranked[1].probability - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_missing_disease_counts_as_zero() {
        let agg = EnsembleAggregator::new();
        let ranked = agg
            .aggregate(&[vote("a", &[(1, 1.0)]), vote("b", &[(2, 1.0)]), vote("c", &[(2, 1.0)])])
            .unwrap();
        assert_eq!(ranked[0].disease_id, 2);
        assert!((ranked[0].probability - 2.0 / 3.0).abs() < 1e-12);
        assert!((ranked[1].probability - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_ties_broken_by_lower_id() {
        let agg = EnsembleAggregator::new();
        let ranked = agg
            .aggregate(&[vote("a", &[(9, 0.25), (3, 0.25), (5, 0.25), (1, 0.25)])])
            .unwrap();
        let ids: Vec<_> = ranked.iter().map(|r| r.disease_id).collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }

    #[test]
    fn test_truncates_to_top_k() {
        let agg = EnsembleAggregator::with_top_k(2);
        let ranked = agg
            .aggregate(&[vote("a", &[(1, 0.1), (2, 0.2), (3, 0.3), (4, 0.4)])])
            .unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].disease_id, 4);
        assert_eq!(ranked[1].disease_id, 3);
    }

    #[test]
    fn test_votes_count_agreeing_labels() {
        let agg = EnsembleAggregator::new();
        let ranked = agg
            .aggregate(&[
                vote("a", &[(1, 0.9), (2, 0.1)]),
                vote("b", &[(1, 0.7), (2, 0.3)]),
                vote("c", &[(1, 0.4), (2, 0.6)]),
            ])
            .unwrap();
        assert_eq!(ranked[0].disease_id, 1);
        assert_eq!(ranked[0].votes, 2);
        assert_eq!(ranked[1].votes, 1);
    }

    #[test]
    fn test_no_votes_is_no_prediction() {
        let err = EnsembleAggregator::new().aggregate(&[]).unwrap_err();
        assert_eq!(err.tag(), "no_prediction_available");
    }

    #[test]
    fn test_empty_distributions_is_no_prediction() {
        let err = EnsembleAggregator::new()
            .aggregate(&[Vote::new("a", ClassifierOutput::new(), None)])
            .unwrap_err();
        assert!(matches!(err, PredictionError::NoPredictionAvailable(_)));
    }

    #[test]
    fn test_top_k_never_zero() {
        assert_eq!(EnsembleAggregator::with_top_k(0).top_k(), 1);
    }
}
