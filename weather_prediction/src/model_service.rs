use crate::preprocess::NormalizedTensor;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to load model {path:?}: {reason}")]
    Load { path: PathBuf, reason: String },
    #[error("session mutex poisoned: {0}")]
    Poisoned(String),
    #[error("failed to build input tensor: {0}")]
    Input(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("model produced an empty output")]
    EmptyOutput,
}

/// Model output, one score per class, in the order the model was trained on.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityVector(Vec<f32>);

impl ProbabilityVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Index and value of the highest score; the first index wins a tie.
    pub fn argmax(&self) -> Option<(usize, f32)> {
        self.0
            .iter()
            .copied()
            .enumerate()
            .reduce(|accum, item| if item.1 > accum.1 { item } else { accum })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }
}

impl From<Vec<f32>> for ProbabilityVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// A pretrained classifier: one normalized image in, one score per class out.
pub trait ModelService: Send + Sync + 'static {
    fn predict(&self, input: &NormalizedTensor) -> Result<ProbabilityVector, ModelError>;
}
