use crate::{
    config::InputLayout,
    model_service::{ModelError, ModelService, ProbabilityVector},
    preprocess::NormalizedTensor,
};
use ndarray::{Array, Axis, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

/// Adds the batch axis and lays the tensor out the way the model expects.
fn to_model_input(tensor: &NormalizedTensor, layout: InputLayout) -> Array<f32, Ix4> {
    let view = tensor.as_array().view();
    let batched = match layout {
        InputLayout::Nhwc => view.insert_axis(Axis(0)),
        InputLayout::Nchw => view.permuted_axes([2, 0, 1]).insert_axis(Axis(0)),
    };
    batched.as_standard_layout().into_owned()
}

/// A pool of ONNX Runtime sessions for one model file, handed out round-robin.
#[derive(Clone)]
pub struct OrtModelService {
    name: String,
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    layout: InputLayout,
}

impl OrtModelService {
    pub fn new(
        name: &str,
        path: &Path,
        num_instances: usize,
        layout: InputLayout,
    ) -> Result<Self, ModelError> {
        if !path.exists() {
            return Err(ModelError::Load {
                path: path.to_path_buf(),
                reason: "file not found".to_string(),
            });
        }

        let sessions = (0..num_instances.max(1))
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(path)?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ort::Error>>()
            .map_err(|e| ModelError::Load {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        tracing::info!(
            model = name,
            path = %path.display(),
            "Created {} ONNX sessions",
            sessions.len()
        );

        Ok(Self {
            name: name.to_string(),
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            layout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<Vec<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ModelError::Poisoned(e.to_string()))?;

        tracing::debug!(model = %self.name, "Handling request with session {}", index);

        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| ModelError::Input(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Inference(format!("failed to extract tensor: {}", e)))?;

        if data.is_empty() {
            return Err(ModelError::EmptyOutput);
        }

        Ok(data.to_vec())
    }
}

impl ModelService for OrtModelService {
    fn predict(&self, input: &NormalizedTensor) -> Result<ProbabilityVector, ModelError> {
        let input = to_model_input(input, self.layout);
        self.run_inference(&input).map(ProbabilityVector::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn gradient_tensor() -> NormalizedTensor {
        let array = Array3::from_shape_fn(NormalizedTensor::SHAPE, |(y, x, c)| {
            ((y * 7 + x * 3 + c) % 256) as f32 / 255.
        });
        NormalizedTensor::from_array(array).unwrap()
    }

    #[test]
    fn test_nhwc_input_keeps_pixel_order() {
        let tensor = gradient_tensor();
        let input = to_model_input(&tensor, InputLayout::Nhwc);

        assert_eq!(input.shape(), &[1, 224, 224, 3]);
        assert_eq!(input[[0, 5, 9, 2]], tensor.as_array()[[5, 9, 2]]);
        assert!(input.is_standard_layout());
    }

    #[test]
    fn test_nchw_input_moves_channels_first() {
        let tensor = gradient_tensor();
        let input = to_model_input(&tensor, InputLayout::Nchw);

        assert_eq!(input.shape(), &[1, 3, 224, 224]);
        assert_eq!(input[[0, 2, 5, 9]], tensor.as_array()[[5, 9, 2]]);
        assert_eq!(input[[0, 0, 100, 3]], tensor.as_array()[[100, 3, 0]]);
        assert!(input.is_standard_layout());
    }

    #[test]
    fn test_missing_model_file_fails_to_load() {
        let result = OrtModelService::new(
            "weather",
            Path::new("does/not/exist.onnx"),
            1,
            InputLayout::Nhwc,
        );

        assert!(matches!(result, Err(ModelError::Load { .. })));
    }
}
