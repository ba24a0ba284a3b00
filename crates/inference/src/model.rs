use crate::artifacts::ModelArtifacts;
use crate::backend::{BackendOptions, InferenceBackend};
use crate::descriptor::ModelDescriptor;
use crate::error::{InferenceError, ModelLoadError};
use ndarray::{Array, ArrayD, Axis, IxDyn};

/// Scores for one sample, in model output order
pub type PredictionVector = Vec<f32>;

/// A loaded classifier: backend plus the architecture it was built from.
pub struct Model<B: InferenceBackend> {
    backend: B,
    descriptor: ModelDescriptor,
}

impl<B: InferenceBackend> Model<B> {
    pub fn new(backend: B, descriptor: ModelDescriptor) -> Self {
        Self {
            backend,
            descriptor,
        }
    }

    pub fn load(artifacts: ModelArtifacts, options: &BackendOptions) -> Result<Self, ModelLoadError> {
        let compile = &artifacts.descriptor.compile;
        tracing::info!(
            optimizer = %compile.optimizer,
            loss = %compile.loss,
            metrics = ?compile.metrics,
            "Compile settings (unused for inference)"
        );

        let backend = B::load_model(&artifacts, options)?;
        Ok(Self::new(backend, artifacts.descriptor))
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    /// Spatial input size as (width, height)
    pub fn input_size(&self) -> (u32, u32) {
        self.descriptor.input_size()
    }

    /// Forward pass on a single-sample batch, one output row per sample.
    pub fn predict(
        &mut self,
        batch: &Array<f32, IxDyn>,
    ) -> Result<Vec<PredictionVector>, InferenceError> {
        let expected = self.descriptor.batch_shape();
        if batch.shape() != expected.as_slice() {
            return Err(InferenceError::InputShape {
                expected,
                actual: batch.shape().to_vec(),
            });
        }

        let output = self.backend.infer(batch)?;
        let rows = split_rows(&output)?;

        if let Some(expected) = self.descriptor.output_dim() {
            if let Some(row) = rows.iter().find(|row| row.len() != expected) {
                return Err(InferenceError::OutputShape {
                    expected,
                    actual: row.len(),
                });
            }
        }

        Ok(rows)
    }
}

/// Keep the leading batch axis and flatten everything after it.
fn split_rows(output: &ArrayD<f32>) -> Result<Vec<PredictionVector>, InferenceError> {
    if output.is_empty() {
        return Err(InferenceError::EmptyOutput);
    }

    if output.ndim() == 0 {
        return Ok(vec![output.iter().copied().collect()]);
    }

    Ok(output
        .axis_iter(Axis(0))
        .map(|sample| sample.iter().copied().collect())
        .collect())
}
