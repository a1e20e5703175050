//! Feature encoding for classifier inference
//!
//! Turns a set of reported symptom codes into the binary feature vector the
//! classifiers were trained on. Unknown codes are ignored and reported back
//! so the service can flag them.

use crate::models::FeatureVector;
use crate::registry::SymptomRegistry;
use std::collections::HashSet;
use std::sync::Arc;

/// Result of encoding one request
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSymptoms {
    pub features: FeatureVector,
    /// Recognised codes, deduplicated, in input order
    pub recognized: Vec<String>,
    /// Unknown codes, deduplicated, in input order
    pub unrecognized: Vec<String>,
}

impl EncodedSymptoms {
    pub fn has_recognized(&self) -> bool {
        !self.recognized.is_empty()
    }
}

/// Encodes symptom codes against a shared registry
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    registry: Arc<SymptomRegistry>,
}

impl FeatureEncoder {
    pub fn new(registry: Arc<SymptomRegistry>) -> Self {
        Self { registry }
    }

    /// Length of every vector this encoder produces
    pub fn dimension(&self) -> usize {
        self.registry.len()
    }

    pub fn encode<I, S>(&self, codes: I) -> FeatureVector
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.encode_reported(codes).features
    }

    pub fn encode_reported<I, S>(&self, codes: I) -> EncodedSymptoms
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut features = FeatureVector::zeros(self.registry.len());
        let mut seen_unknown = HashSet::new();
        let mut recognized = Vec::new();
        let mut unrecognized = Vec::new();

        for code in codes {
            let code = code.as_ref().trim();
            if code.is_empty() {
                continue;
            }
            match self.registry.index_of(code) {
                Some(index) => {
                    if features.as_slice()[index] == 0.0 {
                        features.set(index);
                        recognized.push(self.registry.code_of(index).unwrap_or(code).to_string());
                    }
                }
                None => {
                    if seen_unknown.insert(code.to_string()) {
                        unrecognized.push(code.to_string());
                    }
                }
            }
        }

        EncodedSymptoms {
            features,
            recognized,
            unrecognized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> FeatureEncoder {
        let registry =
            SymptomRegistry::from_codes(["itching", "skin_rash", "fatigue", "cough"]).unwrap();
        FeatureEncoder::new(Arc::new(registry))
    }

    #[test]
    fn test_known_codes_set_their_slots() {
        let v = encoder().encode(["fatigue", "itching"]);
        assert_eq!(v.as_slice(), &[1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_unknown_codes_ignored_and_reported() {
        let encoded = encoder().encode_reported(["itching", "glowing_skin", "fatigue"]);
        assert_eq!(encoded.features.active_count(), 2);
        assert_eq!(encoded.recognized, vec!["itching", "fatigue"]);
        assert_eq!(encoded.unrecognized, vec!["glowing_skin"]);
    }

    #[test]
    fn test_empty_input_yields_zero_vector() {
        let encoded = encoder().encode_reported(Vec::<String>::new());
        assert_eq!(encoded.features.len(), 4);
        assert_eq!(encoded.features.active_count(), 0);
        assert!(!encoded.has_recognized());
    }

    #[test]
    fn test_duplicates_counted_once() {
        let encoded = encoder().encode_reported(["cough", "cough", "nope", "nope"]);
        assert_eq!(encoded.recognized, vec!["cough"]);
        assert_eq!(encoded.unrecognized, vec!["nope"]);
    }

    #[test]
    fn test_blank_and_mixed_case_codes() {
        let encoded = encoder().encode_reported(["  ", "Itching", "itching ", ""]);
        assert_eq!(encoded.recognized, vec!["itching"]);
        assert!(encoded.unrecognized.is_empty());
    }
}
