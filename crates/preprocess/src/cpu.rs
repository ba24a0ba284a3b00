use crate::config::{CHANNELS, DEFAULT_INPUT_SIZE};
use crate::{PreprocessError, PreprocessResult};
use common::span;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use image::{DynamicImage, RgbImage};
use ndarray::{Array, IxDyn};

/// Turns uploaded image bytes into the model's input batch.
///
/// The output is NHWC `[1, height, width, 3]` with pixel values left in
/// their native 0-255 range; no mean/std normalization is applied.
#[derive(Debug, Clone, Copy)]
pub struct ImagePreprocessor {
    pub input_size: (u32, u32),
}

impl ImagePreprocessor {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self { input_size }
    }

    pub fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    /// Decode an upload, guessing the format from its content.
    pub fn decode(&self, bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
        let _s = span!("decode_image");

        let image = image::load_from_memory(bytes)?;
        if image.width() == 0 || image.height() == 0 {
            return Err(PreprocessError::EmptyImage {
                width: image.width(),
                height: image.height(),
            });
        }

        Ok(image)
    }

    pub fn preprocess(&self, bytes: &[u8]) -> Result<PreprocessResult, PreprocessError> {
        let _s = span!("preprocess_image");

        let image = self.decode(bytes)?;
        let original_size = (image.width(), image.height());
        let original_color = image.color();

        tracing::trace!(
            width = original_size.0,
            height = original_size.1,
            color = ?original_color,
            upload_bytes = bytes.len(),
            "Decoded upload"
        );

        // Grayscale is expanded and alpha dropped before resizing
        let rgb = image.to_rgb8();
        let resized = self.resize(&rgb)?;
        let tensor = Self::to_batch(&resized)?;

        Ok(PreprocessResult {
            tensor,
            original_size,
            original_color,
        })
    }

    fn resize(&self, rgb: &RgbImage) -> Result<Image<'static>, PreprocessError> {
        let _s = span!("resize");

        let (width, height) = rgb.dimensions();
        let src = ImageRef::new(width, height, rgb.as_raw(), PixelType::U8x3)?;

        let mut resized = Image::new(self.input_size.0, self.input_size.1, PixelType::U8x3);

        Resizer::new().resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::CatmullRom)),
        )?;

        Ok(resized)
    }

    fn to_batch(image: &Image) -> Result<Array<f32, IxDyn>, PreprocessError> {
        let width = image.width() as usize;
        let height = image.height() as usize;

        let values: Vec<f32> = image.buffer().iter().map(|&v| v as f32).collect();

        Ok(Array::from_shape_vec(
            IxDyn(&[1, height, width, CHANNELS]),
            values,
        )?)
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}
