use super::{BackendOptions, ExecutionProvider, InferenceBackend};
use crate::artifacts::ModelArtifacts;
use crate::error::{InferenceError, ModelLoadError};
use common::span;
use ndarray::{Array, ArrayD, IxDyn};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use std::path::Path;

/// ONNX Runtime session over the weights blob.
///
/// The graph is fed positionally: first input gets the NHWC batch, first
/// output is returned as the prediction tensor.
pub struct OrtBackend {
    session: Session,
}

fn load_err(e: impl std::fmt::Display) -> ModelLoadError {
    ModelLoadError::Runtime(e.to_string())
}

fn run_err(e: impl std::fmt::Display) -> InferenceError {
    InferenceError::Runtime(e.to_string())
}

#[cfg(feature = "cuda")]
fn ensure_provider_available(_provider: ExecutionProvider) -> Result<(), ModelLoadError> {
    Ok(())
}

#[cfg(not(feature = "cuda"))]
fn ensure_provider_available(provider: ExecutionProvider) -> Result<(), ModelLoadError> {
    match provider {
        ExecutionProvider::Cpu => Ok(()),
        ExecutionProvider::Cuda => Err(ModelLoadError::Runtime(
            "CUDA execution provider requested but the binary was built without the `cuda` feature"
                .to_string(),
        )),
    }
}

impl OrtBackend {
    /// Load model with specified execution provider
    pub fn load_model_with_provider(
        path: &Path,
        provider: ExecutionProvider,
        intra_threads: usize,
    ) -> Result<Self, ModelLoadError> {
        ensure_provider_available(provider)?;

        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let builder = Session::builder()
            .map_err(load_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_err)?
            .with_intra_threads(intra_threads)
            .map_err(load_err)?;

        let builder = match provider {
            #[cfg(feature = "cuda")]
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder
                    .with_execution_providers([
                        ort::execution_providers::CUDAExecutionProvider::default()
                            .with_device_id(0)
                            .build()
                            .error_on_failure(),
                    ])
                    .map_err(load_err)?
            }
            _ => {
                tracing::info!(provider = %provider, "Initializing ONNX Runtime");
                builder
            }
        };

        let session = builder.commit_from_file(path).map_err(load_err)?;

        tracing::info!("Model loaded from {}", path.display());
        Ok(Self { session })
    }
}

impl InferenceBackend for OrtBackend {
    fn load_model(
        artifacts: &ModelArtifacts,
        options: &BackendOptions,
    ) -> Result<Self, ModelLoadError> {
        Self::load_model_with_provider(
            &artifacts.weights_path,
            options.provider,
            options.intra_threads,
        )
    }

    fn infer(&mut self, batch: &Array<f32, IxDyn>) -> Result<ArrayD<f32>, InferenceError> {
        let _s = span!("ort_run");

        let input = TensorRef::from_array_view(batch.view()).map_err(run_err)?;
        let outputs = self.session.run(ort::inputs![input]).map_err(run_err)?;

        let scores = outputs[0].try_extract_array::<f32>().map_err(run_err)?;

        Ok(scores.into_owned())
    }
}
