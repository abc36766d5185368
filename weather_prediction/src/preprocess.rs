use image::imageops::FilterType;
use ndarray::Array3;
use std::io::Cursor;
use thiserror::Error;

/// Side length of the square input both models were trained on.
pub const IMAGE_SIZE: u32 = 224;
pub const CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image data is empty")]
    Empty,
    #[error("unrecognised image data: {0}")]
    Format(#[from] std::io::Error),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("tensor shape {actual:?} does not match the model input {expected:?}")]
    Shape {
        expected: [usize; 3],
        actual: Vec<usize>,
    },
    #[error("tensor value {0} is outside [0, 1]")]
    Range(f32),
}

/// A `224 x 224 x 3` image tensor in height, width, channel order with every
/// value scaled into `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor(Array3<f32>);

impl NormalizedTensor {
    pub const SHAPE: [usize; 3] = [IMAGE_SIZE as usize, IMAGE_SIZE as usize, CHANNELS];

    pub fn from_array(array: Array3<f32>) -> Result<Self, DecodeError> {
        if array.shape() != Self::SHAPE {
            return Err(DecodeError::Shape {
                expected: Self::SHAPE,
                actual: array.shape().to_vec(),
            });
        }
        if let Some(value) = array.iter().find(|v| !(0.0..=1.0).contains(*v)) {
            return Err(DecodeError::Range(*value));
        }
        Ok(Self(array))
    }

    /// All-black tensor, used to probe model output widths at startup.
    pub fn zeros() -> Self {
        Self(Array3::zeros(Self::SHAPE))
    }

    pub fn as_array(&self) -> &Array3<f32> {
        &self.0
    }
}

/// Decodes any supported image format, converts it to RGB, resizes it to the
/// model input size and scales pixel values into `[0, 1]`.
pub fn normalize_image(image_data: &[u8]) -> Result<NormalizedTensor, DecodeError> {
    if image_data.is_empty() {
        return Err(DecodeError::Empty);
    }

    let original_img = image::ImageReader::new(Cursor::new(image_data))
        .with_guessed_format()?
        .decode()?;

    let rgb = original_img.to_rgb8();
    let img = image::imageops::resize(&rgb, IMAGE_SIZE, IMAGE_SIZE, FilterType::CatmullRom);

    let input = Array3::from_shape_fn(NormalizedTensor::SHAPE, |(y, x, c)| {
        img.get_pixel(x as u32, y as u32).0[c] as f32 / 255.
    });

    NormalizedTensor::from_array(input)
}
