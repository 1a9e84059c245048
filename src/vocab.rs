//! Label vocabulary: species code to class index
//!
//! Loaded once at startup from `labels.json` (a JSON object mapping species
//! code to class index, written by the ingestion pipeline). The vocabulary
//! size defines the classifier's output width, so indices must be unique and
//! dense in `0..len`; anything else is a configuration error caught before
//! the service starts.

use crate::{Error, Result};
use ndarray::Array1;
use std::collections::HashMap;
use std::path::Path;

/// Immutable species-code → class-index mapping
#[derive(Debug, Clone)]
pub struct LabelVocabulary {
    classes: HashMap<String, usize>,
}

impl LabelVocabulary {
    /// Load and validate the vocabulary file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read vocabulary {}: {}", path.display(), e))
        })?;
        let classes: HashMap<String, usize> = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("invalid vocabulary {}: {}", path.display(), e))
        })?;
        Self::new(classes)
    }

    /// Build a vocabulary from an in-memory mapping, validating density
    pub fn new(classes: HashMap<String, usize>) -> Result<Self> {
        if classes.is_empty() {
            return Err(Error::Config("vocabulary is empty".to_string()));
        }
        let mut seen = vec![false; classes.len()];
        for (code, &index) in &classes {
            if index >= classes.len() {
                return Err(Error::Config(format!(
                    "vocabulary index {} for '{}' out of range (size {})",
                    index,
                    code,
                    classes.len()
                )));
            }
            if seen[index] {
                return Err(Error::Config(format!(
                    "vocabulary index {} assigned twice (at '{}')",
                    index, code
                )));
            }
            seen[index] = true;
        }
        Ok(Self { classes })
    }

    /// Number of classes (the classifier's output width)
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Class index for a species code, if known
    pub fn class_index(&self, code: &str) -> Option<usize> {
        self.classes.get(code).copied()
    }

    /// Reject label sets containing codes outside the vocabulary
    pub fn validate(&self, labels: &[String]) -> Result<()> {
        for label in labels {
            if !self.classes.contains_key(label.as_str()) {
                return Err(Error::UnknownLabel(label.clone()));
            }
        }
        Ok(())
    }

    /// Multi-hot target vector for a label set. An empty set is a valid
    /// "confirmed no call" target (all zeros).
    pub fn multi_hot(&self, labels: &[String]) -> Result<Array1<f32>> {
        let mut target = Array1::zeros(self.classes.len());
        for label in labels {
            let index = self
                .class_index(label)
                .ok_or_else(|| Error::UnknownLabel(label.clone()))?;
            target[index] = 1.0;
        }
        Ok(target)
    }
}
