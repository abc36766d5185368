//! Two-stage classification: an optional sky gate followed by the weather
//! classifier.

use crate::{
    config::SkyDetectorConfig,
    labels::ClassLabelSet,
    model_service::{ModelError, ModelService, ProbabilityVector},
    preprocess::{normalize_image, DecodeError, NormalizedTensor},
};
use indexmap::IndexMap;
use thiserror::Error;
use tracing::instrument;

/// The only label that counts as rain.
pub const RAIN_LABEL: &str = "hujan";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("weather model is not loaded")]
    ModelUnavailable,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("{model} model returned {actual} scores, expected {expected}")]
    OutputWidth {
        model: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Rounds half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.).round() / 100.
}

fn to_percentage(value: f32) -> f64 {
    round2(value as f64 * 100.)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkyGateDecision {
    pub accepted: bool,
    pub confidence: f32,
}

impl SkyGateDecision {
    /// Decision used when no sky detector is loaded.
    pub fn pass_through() -> Self {
        Self {
            accepted: true,
            confidence: 1.0,
        }
    }

    pub fn confidence_percentage(&self) -> f64 {
        to_percentage(self.confidence)
    }
}

pub struct SkyGate<M: ModelService> {
    model: M,
    threshold: f32,
    sky_class_index: usize,
}

impl<M: ModelService> SkyGate<M> {
    pub fn new(model: M, threshold: f32, sky_class_index: usize) -> Self {
        Self {
            model,
            threshold,
            sky_class_index,
        }
    }

    pub fn from_config(model: M, sky_cfg: &SkyDetectorConfig) -> Self {
        Self::new(model, sky_cfg.confidence_threshold, sky_cfg.sky_class_index)
    }

    /// A non-sky top class is rejected outright; a sky top class must also
    /// reach the threshold.
    pub fn decide(&self, scores: &ProbabilityVector) -> Result<SkyGateDecision, PipelineError> {
        let (index, confidence) = scores.argmax().ok_or(ModelError::EmptyOutput)?;
        let accepted = index == self.sky_class_index && confidence >= self.threshold;

        Ok(SkyGateDecision {
            accepted,
            confidence,
        })
    }

    pub fn evaluate(&self, input: &NormalizedTensor) -> Result<SkyGateDecision, PipelineError> {
        let scores = self.model.predict(input)?;
        self.decide(&scores)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub label: String,
    pub confidence: f64,
    pub probabilities: IndexMap<String, f64>,
    pub is_rain: bool,
}

impl PredictionResult {
    pub fn from_scores(
        scores: &ProbabilityVector,
        labels: &ClassLabelSet,
    ) -> Result<Self, PipelineError> {
        if scores.len() != labels.len() {
            return Err(PipelineError::OutputWidth {
                model: "weather",
                expected: labels.len(),
                actual: scores.len(),
            });
        }

        let (index, confidence) = scores.argmax().ok_or(ModelError::EmptyOutput)?;
        let label = labels.get(index).ok_or(ModelError::EmptyOutput)?.to_string();

        let probabilities = labels
            .iter()
            .zip(scores.values())
            .map(|(label, score)| (label.to_string(), to_percentage(*score)))
            .collect();

        Ok(Self {
            is_rain: label == RAIN_LABEL,
            label,
            confidence: to_percentage(confidence),
            probabilities,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassifyOutcome {
    Success {
        prediction: PredictionResult,
        /// Percentage, 100 when the gate is disabled.
        sky_confidence: f64,
    },
    SkyRejected {
        sky_confidence: f64,
    },
}

pub struct InferencePipeline<M: ModelService> {
    weather: Option<M>,
    sky_gate: Option<SkyGate<M>>,
    labels: ClassLabelSet,
}

impl<M: ModelService> InferencePipeline<M> {
    pub fn new(weather: Option<M>, sky_gate: Option<SkyGate<M>>, labels: ClassLabelSet) -> Self {
        Self {
            weather,
            sky_gate,
            labels,
        }
    }

    pub fn is_weather_model_loaded(&self) -> bool {
        self.weather.is_some()
    }

    pub fn is_sky_gate_enabled(&self) -> bool {
        self.sky_gate.is_some()
    }

    pub fn labels(&self) -> &ClassLabelSet {
        &self.labels
    }

    /// Probes every loaded model once and checks its output width: the
    /// weather model must produce one score per label and the sky detector
    /// must cover its sky class.
    pub fn verify_output_widths(&self) -> Result<(), PipelineError> {
        let probe = NormalizedTensor::zeros();

        if let Some(weather) = &self.weather {
            let width = weather.predict(&probe)?.len();
            if width != self.labels.len() {
                return Err(PipelineError::OutputWidth {
                    model: "weather",
                    expected: self.labels.len(),
                    actual: width,
                });
            }
        }

        if let Some(gate) = &self.sky_gate {
            let width = gate.model.predict(&probe)?.len();
            if width < 2 || gate.sky_class_index >= width {
                return Err(PipelineError::OutputWidth {
                    model: "sky detector",
                    expected: (gate.sky_class_index + 1).max(2),
                    actual: width,
                });
            }
        }

        Ok(())
    }

    #[instrument(skip(self, image_data), fields(bytes = image_data.len()))]
    pub fn classify(&self, image_data: &[u8]) -> Result<ClassifyOutcome, PipelineError> {
        let weather = self.weather.as_ref().ok_or(PipelineError::ModelUnavailable)?;

        let input = normalize_image(image_data)?;

        let gate = match &self.sky_gate {
            Some(gate) => gate.evaluate(&input)?,
            None => SkyGateDecision::pass_through(),
        };
        let sky_confidence = gate.confidence_percentage();

        if !gate.accepted {
            tracing::info!(sky_confidence, "Image rejected by the sky gate");
            return Ok(ClassifyOutcome::SkyRejected { sky_confidence });
        }

        let scores = weather.predict(&input)?;
        let prediction = PredictionResult::from_scores(&scores, &self.labels)?;

        tracing::info!(
            "Prediction: {} ({:.2}%)",
            prediction.label,
            prediction.confidence
        );

        Ok(ClassifyOutcome::Success {
            prediction,
            sky_confidence,
        })
    }
}
