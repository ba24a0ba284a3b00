pub mod config;
pub mod cpu;
pub mod error;

use image::ColorType;
use ndarray::{Array, IxDyn};

pub use config::{CHANNELS, DEFAULT_INPUT_SIZE};
pub use cpu::ImagePreprocessor;
pub use error::PreprocessError;

/// Result of preprocessing one uploaded image
#[derive(Debug)]
pub struct PreprocessResult {
    /// NHWC tensor of shape `[1, height, width, 3]`, raw 0-255 values
    pub tensor: Array<f32, IxDyn>,
    /// Width and height of the decoded upload
    pub original_size: (u32, u32),
    /// Colour layout of the decoded upload before RGB conversion
    pub original_color: ColorType,
}
