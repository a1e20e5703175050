//! Artifact loading and validation
//!
//! This module provides:
//! - Manifest parsing for the artifact directory
//! - SHA256 checksum validation before a model is parsed
//! - Schema id checks tying every artifact to the registry's feature order
//!
//! Loading is all-or-nothing. Any missing, corrupt or mismatched artifact is
//! a startup error and the service never comes up with a partial ensemble.

use crate::error::StartupError;
use crate::metadata::DiseaseCatalog;
use crate::predictor::{load_classifier, Classifier, ClassifierKind};
use crate::registry::SymptomRegistry;
use serde::{de::DeserializeOwned, Deserialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Manifest file name inside the artifact directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Artifact directory manifest
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub schema_id: String,
    /// Training table whose header defines the registry
    pub registry: PathBuf,
    /// Disease metadata table
    pub metadata: PathBuf,
    pub classifiers: Vec<ClassifierEntry>,
}

/// One ensemble member
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierEntry {
    pub name: String,
    pub kind: ClassifierKind,
    pub path: PathBuf,
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Everything the prediction service needs, fully validated
pub struct ArtifactBundle {
    pub registry: Arc<SymptomRegistry>,
    pub classifiers: Vec<Arc<dyn Classifier>>,
    pub catalog: Arc<DiseaseCatalog>,
}

impl std::fmt::Debug for ArtifactBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactBundle")
            .field("symptoms", &self.registry.len())
            .field("schema_id", &self.registry.schema_id())
            .field(
                "classifiers",
                &self.classifiers.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("diseases", &self.catalog.len())
            .finish()
    }
}

impl Manifest {
    pub fn load(dir: &Path) -> Result<Self, StartupError> {
        let manifest: Manifest = read_json(&dir.join(MANIFEST_FILE))?;
        if manifest.classifiers.is_empty() {
            return Err(StartupError::EmptyEnsemble);
        }
        let mut names = HashSet::new();
        for entry in &manifest.classifiers {
            if !names.insert(entry.name.as_str()) {
                return Err(StartupError::invalid_model(
                    &entry.name,
                    "duplicate classifier name in manifest",
                ));
            }
        }
        Ok(manifest)
    }
}

/// Load and cross-check every artifact in `dir`
pub fn load_artifacts(dir: &Path) -> Result<ArtifactBundle, StartupError> {
    let manifest = Manifest::load(dir)?;

    let registry = SymptomRegistry::from_training_header(&dir.join(&manifest.registry))?;
    let schema_id = registry.schema_id().to_string();
    if manifest.schema_id != schema_id {
        return Err(StartupError::SchemaMismatch {
            artifact: MANIFEST_FILE.to_string(),
            expected: schema_id,
            found: manifest.schema_id,
        });
    }

    let mut classifiers = Vec::with_capacity(manifest.classifiers.len());
    for entry in &manifest.classifiers {
        let path = dir.join(&entry.path);
        if let Some(expected) = entry.sha256.as_deref() {
            verify_checksum(&path, expected)?;
        }
        let classifier = load_classifier(&entry.name, entry.kind, &path, &schema_id)?;
        if classifier.n_features() != registry.len() {
            return Err(StartupError::invalid_model(
                path.display().to_string(),
                format!(
                    "model expects {} features, registry has {}",
                    classifier.n_features(),
                    registry.len()
                ),
            ));
        }
        info!(
            classifier = %entry.name,
            kind = %entry.kind,
            classes = classifier.classes().len(),
            "Classifier loaded"
        );
        classifiers.push(classifier);
    }

    let catalog = DiseaseCatalog::load(&dir.join(&manifest.metadata), &schema_id)?;
    for classifier in &classifiers {
        let missing: Vec<_> = classifier
            .classes()
            .iter()
            .filter(|id| !catalog.contains(**id))
            .collect();
        if !missing.is_empty() {
            warn!(
                classifier = %classifier.name(),
                missing = ?missing,
                "Classifier labels have no disease metadata"
            );
        }
    }

    Ok(ArtifactBundle {
        registry: Arc::new(registry),
        classifiers,
        catalog: Arc::new(catalog),
    })
}

/// Compute SHA256 checksum of data as lowercase hex
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn verify_checksum(path: &Path, expected: &str) -> Result<(), StartupError> {
    let bytes = fs::read(path).map_err(|source| StartupError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let actual = compute_checksum(&bytes);
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(StartupError::ChecksumMismatch {
            artifact: path.display().to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Read and parse a JSON artifact
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StartupError> {
    let bytes = fs::read(path).map_err(|source| StartupError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| StartupError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
