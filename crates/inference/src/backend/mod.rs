use crate::artifacts::ModelArtifacts;
use crate::error::{InferenceError, ModelLoadError};
use ndarray::{Array, ArrayD, IxDyn};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "ort-backend")]
pub mod ort;

/// Runtime that executes the classifier's forward pass.
///
/// Implementations are loaded once at startup and then driven by one caller
/// at a time; the HTTP layer serialises access.
pub trait InferenceBackend: Send + 'static {
    fn load_model(artifacts: &ModelArtifacts, options: &BackendOptions) -> Result<Self, ModelLoadError>
    where
        Self: Sized;

    /// Run a forward pass on an NHWC batch and return the raw output tensor
    fn infer(&mut self, batch: &Array<f32, IxDyn>) -> Result<ArrayD<f32>, InferenceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
}

impl ExecutionProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionProvider::Cpu => "cpu",
            ExecutionProvider::Cuda => "cuda",
        }
    }
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            other => Err(format!(
                "{} is not a supported execution provider. Use either `cpu` or `cuda`.",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOptions {
    pub provider: ExecutionProvider,
    pub intra_threads: usize,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            provider: ExecutionProvider::Cpu,
            intra_threads: 4,
        }
    }
}
