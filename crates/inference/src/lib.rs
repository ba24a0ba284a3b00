pub mod artifacts;
pub mod backend;
pub mod descriptor;
pub mod error;
pub mod model;

// Re-export commonly used types for convenience
pub use artifacts::{ModelArtifacts, ModelPaths};
pub use backend::{BackendOptions, ExecutionProvider, InferenceBackend};
pub use descriptor::{CompileSettings, InputShape, ModelDescriptor};
pub use error::{InferenceError, ModelLoadError};
pub use model::{Model, PredictionVector};

#[cfg(feature = "ort-backend")]
pub use backend::ort::OrtBackend;
