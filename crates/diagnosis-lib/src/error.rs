//! Error taxonomy for the diagnosis engine
//!
//! Startup errors halt the process. Request errors are recovered at the
//! request boundary and carry a tag callers can branch on. Scoring and
//! metadata errors never leave the service; they become response warnings.

use crate::models::DiseaseId;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors raised while loading artifacts
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed artifact {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid symptom registry: {0}")]
    Registry(String),

    #[error("schema mismatch in {artifact}: registry is {expected}, artifact declares {found}")]
    SchemaMismatch {
        artifact: String,
        expected: String,
        found: String,
    },

    #[error("checksum mismatch for {artifact}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        artifact: String,
        expected: String,
        actual: String,
    },

    #[error("invalid model {artifact}: {reason}")]
    InvalidModel { artifact: String, reason: String },

    #[error("invalid disease metadata: {0}")]
    Metadata(String),

    #[error("ensemble has no classifiers")]
    EmptyEnsemble,
}

impl StartupError {
    pub(crate) fn invalid_model(artifact: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidModel {
            artifact: artifact.into(),
            reason: reason.into(),
        }
    }
}

/// Request-level errors reported to the caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PredictionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no prediction available: {0}")]
    NoPredictionAvailable(String),
}

impl PredictionError {
    /// Stable tag for the transport layer
    pub fn tag(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NoPredictionAvailable(_) => "no_prediction_available",
        }
    }
}

/// Failure of one classifier while scoring one request
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error("feature vector has {actual} slots, model expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("model produced an invalid distribution: {0}")]
    InvalidOutput(String),
}

/// Metadata lookup failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("no metadata for disease {0}")]
    NotFound(DiseaseId),
}
