//! Disease prediction engine
//!
//! This crate provides the core functionality for:
//! - The symptom registry and the feature encoding it fixes
//! - Naive Bayes, decision tree and random forest classifiers
//! - Ensemble aggregation and top-k ranking
//! - Disease metadata resolution
//! - Artifact loading, health checks and observability

pub mod artifacts;
pub mod error;
pub mod health;
pub mod metadata;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod registry;

pub use artifacts::{load_artifacts, ArtifactBundle, Manifest};
pub use error::{MetadataError, PredictionError, ScoringError, StartupError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use metadata::DiseaseCatalog;
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use predictor::{PredictionService, ServiceConfig};
pub use registry::SymptomRegistry;
