//! Symptom registry
//!
//! The canonical, ordered list of recognised symptoms. Registry order is the
//! feature-vector order the classifiers were trained on, so the registry is
//! built from the training table header and fingerprinted with a schema id
//! that every artifact must repeat.

use crate::error::StartupError;
use crate::models::Symptom;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Label column of the training table, not a symptom
pub const LABEL_COLUMN: &str = "prognosis";

/// Immutable, ordered symptom registry
#[derive(Debug, Clone)]
pub struct SymptomRegistry {
    symptoms: Vec<Symptom>,
    index: HashMap<String, usize>,
    schema_id: String,
}

impl SymptomRegistry {
    /// Build the registry from codes in feature order
    pub fn from_codes<I, S>(codes: I) -> Result<Self, StartupError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut symptoms = Vec::new();
        let mut index = HashMap::new();

        for raw in codes {
            let code = normalize_code(raw.as_ref());
            if code.is_empty() {
                return Err(StartupError::Registry(format!(
                    "empty symptom code at position {}",
                    symptoms.len()
                )));
            }
            let id = symptoms.len();
            if index.insert(code.clone(), id).is_some() {
                return Err(StartupError::Registry(format!(
                    "duplicate symptom code '{}'",
                    code
                )));
            }
            symptoms.push(Symptom {
                id,
                name: display_name(&code),
                code,
            });
        }

        if symptoms.is_empty() {
            return Err(StartupError::Registry("no symptoms defined".to_string()));
        }

        let schema_id = compute_schema_id(symptoms.iter().map(|s| s.code.as_str()));
        Ok(Self {
            symptoms,
            index,
            schema_id,
        })
    }

    /// Build the registry from the header line of a training CSV file
    pub fn from_training_header(path: &Path) -> Result<Self, StartupError> {
        let content = fs::read_to_string(path).map_err(|source| StartupError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_header(content.lines().next().unwrap_or_default())
    }

    /// Parse a CSV header; empty fields and the label column are skipped
    pub fn parse_header(header: &str) -> Result<Self, StartupError> {
        let codes: Vec<&str> = header
            .trim_start_matches('\u{feff}')
            .split(',')
            .map(str::trim)
            .filter(|field| !field.is_empty() && !field.eq_ignore_ascii_case(LABEL_COLUMN))
            .collect();
        Self::from_codes(codes)
    }

    pub fn all_symptoms(&self) -> &[Symptom] {
        &self.symptoms
    }

    /// Position of `code`; lookups tolerate case and stray whitespace
    pub fn index_of(&self, code: &str) -> Option<usize> {
        self.index
            .get(code)
            .or_else(|| self.index.get(&normalize_code(code)))
            .copied()
    }

    pub fn code_of(&self, index: usize) -> Option<&str> {
        self.symptoms.get(index).map(|s| s.code.as_str())
    }

    pub fn get(&self, index: usize) -> Option<&Symptom> {
        self.symptoms.get(index)
    }

    pub fn len(&self) -> usize {
        self.symptoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symptoms.is_empty()
    }

    /// Fingerprint of the feature ordering
    pub fn schema_id(&self) -> &str {
        &self.schema_id
    }
}

/// SHA256 over the ordered codes joined with newlines, as lowercase hex
pub fn compute_schema_id<'a>(codes: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for (i, code) in codes.into_iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(code.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn normalize_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// "skin_rash" -> "Skin Rash"
fn display_name(code: &str) -> String {
    code.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
