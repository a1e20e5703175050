//! Disease metadata resolution

use crate::artifacts::read_json;
use crate::error::{MetadataError, StartupError};
use crate::models::{Disease, DiseaseId};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct MetadataTable {
    #[serde(default)]
    schema_id: Option<String>,
    diseases: Vec<Disease>,
}

/// Read-only disease table keyed by id
#[derive(Debug, Clone, Default)]
pub struct DiseaseCatalog {
    diseases: HashMap<DiseaseId, Disease>,
}

impl DiseaseCatalog {
    /// Load the metadata table; a declared schema id must match the registry
    pub fn load(path: &Path, schema_id: &str) -> Result<Self, StartupError> {
        let table: MetadataTable = read_json(path)?;
        if let Some(declared) = table.schema_id.as_deref() {
            if declared != schema_id {
                return Err(StartupError::SchemaMismatch {
                    artifact: path.display().to_string(),
                    expected: schema_id.to_string(),
                    found: declared.to_string(),
                });
            }
        }
        let catalog = Self::from_diseases(table.diseases)?;
        debug!(diseases = catalog.len(), "Loaded disease metadata");
        Ok(catalog)
    }

    pub fn from_diseases(diseases: Vec<Disease>) -> Result<Self, StartupError> {
        let mut map = HashMap::with_capacity(diseases.len());
        for disease in diseases {
            if disease.name.trim().is_empty() {
                return Err(StartupError::Metadata(format!(
                    "disease {} has no name",
                    disease.id
                )));
            }
            let id = disease.id;
            if map.insert(id, disease).is_some() {
                return Err(StartupError::Metadata(format!("duplicate disease id {}", id)));
            }
        }
        if map.is_empty() {
            return Err(StartupError::Metadata("metadata table is empty".to_string()));
        }
        Ok(Self { diseases: map })
    }

    pub fn resolve(&self, id: DiseaseId) -> Result<&Disease, MetadataError> {
        self.diseases.get(&id).ok_or(MetadataError::NotFound(id))
    }

    pub fn contains(&self, id: DiseaseId) -> bool {
        self.diseases.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.diseases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diseases.is_empty()
    }
}
