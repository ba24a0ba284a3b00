/// Spatial size (width, height) the classifier expects
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (224, 224);

/// Channel count of the model input
pub const CHANNELS: usize = 3;
