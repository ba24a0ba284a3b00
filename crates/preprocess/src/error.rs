use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Decoded image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("Invalid pixel buffer: {0}")]
    Buffer(#[from] fast_image_resize::ImageBufferError),

    #[error("Resize failed: {0}")]
    Resize(#[from] fast_image_resize::ResizeError),

    #[error("Tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl PreprocessError {
    /// True when the uploaded bytes could not be turned into an image at all.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            PreprocessError::Decode(_) | PreprocessError::EmptyImage { .. }
        )
    }
}
