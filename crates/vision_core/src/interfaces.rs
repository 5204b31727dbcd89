use image::RgbImage;

use crate::VisionError;

/// Classifier input: `[3, height, width]` standardized intensities, channel-first.
///
/// Built once per input image by [`crate::normalize`]; never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    data: Vec<f32>,
    width: u32,
    height: u32,
}

impl NormalizedImage {
    pub const CHANNELS: usize = 3;

    pub fn new(data: Vec<f32>, width: u32, height: u32) -> Result<Self, VisionError> {
        let expected = Self::CHANNELS * width as usize * height as usize;
        if data.len() != expected || expected == 0 {
            return Err(VisionError::Shape {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Batched NCHW shape with a batch of one.
    pub fn shape(&self) -> [usize; 4] {
        [
            1,
            Self::CHANNELS,
            self.height as usize,
            self.width as usize,
        ]
    }
}

/// The decoded RGB input at its native resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    rgb: RgbImage,
}

impl SourceImage {
    pub fn new(rgb: RgbImage) -> Self {
        Self { rgb }
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.rgb.dimensions()
    }
}

/// Single-channel class-activation map at feature-layer resolution (row-major).
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationMap {
    values: Vec<f32>,
    width: usize,
    height: usize,
}

impl ActivationMap {
    pub fn new(values: Vec<f32>, width: usize, height: usize) -> Result<Self, VisionError> {
        let expected = width * height;
        if values.len() != expected || expected == 0 {
            return Err(VisionError::Shape {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            values,
            width,
            height,
        })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }
}

/// Heatmap blended onto the original image, tagged with the model that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplanationOverlay {
    image: RgbImage,
    model_id: String,
}

impl ExplanationOverlay {
    pub fn new(image: RgbImage, model_id: impl Into<String>) -> Self {
        Self {
            image,
            model_id: model_id.into(),
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}
