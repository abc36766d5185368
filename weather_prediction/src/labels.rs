use crate::config::LabelsConfig;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fs::File, io::BufReader, path::Path};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("label set is empty")]
    Empty,
    #[error("label `{0}` appears more than once")]
    Duplicate(String),
    #[error("failed to read metadata file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse metadata file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
}

/// Training artifact describing the weather model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub classes: Option<Vec<String>>,
    pub performance: Performance,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl ModelMetadata {
    pub fn load(path: &Path) -> Result<Self, LabelError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Loads the configured metadata file. A missing file is not an error,
    /// a present but unreadable one is.
    pub fn load_optional(labels_cfg: &LabelsConfig) -> Result<Option<Self>, LabelError> {
        let Some(path) = labels_cfg.metadata_file.as_deref() else {
            return Ok(None);
        };

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Metadata file not found, using the fallback class order"
            );
            return Ok(None);
        }

        let metadata = Self::load(path)?;
        tracing::info!(
            path = %path.display(),
            accuracy = metadata.performance.accuracy * 100.,
            "Loaded model metadata"
        );
        Ok(Some(metadata))
    }
}

/// Ordered class names; position `i` names output `i` of the weather model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabelSet(Vec<String>);

impl ClassLabelSet {
    pub fn new(labels: Vec<String>) -> Result<Self, LabelError> {
        if labels.is_empty() {
            return Err(LabelError::Empty);
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = labels.iter().find(|label| !seen.insert(label.as_str())) {
            return Err(LabelError::Duplicate(duplicate.clone()));
        }
        Ok(Self(labels))
    }

    /// Metadata classes take precedence over the configured fallback order.
    pub fn resolve(
        metadata: Option<&ModelMetadata>,
        labels_cfg: &LabelsConfig,
    ) -> Result<Self, LabelError> {
        match metadata.and_then(|m| m.classes.clone()) {
            Some(classes) => Self::new(classes),
            None => Self::new(labels_cfg.fallback.clone()),
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}
