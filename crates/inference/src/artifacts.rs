use crate::descriptor::ModelDescriptor;
use crate::error::ModelLoadError;
use std::fs;
use std::path::{Path, PathBuf};

/// Filesystem locations of the two model artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub architecture: PathBuf,
    pub weights: PathBuf,
}

impl ModelPaths {
    pub fn new(architecture: impl Into<PathBuf>, weights: impl Into<PathBuf>) -> Self {
        Self {
            architecture: architecture.into(),
            weights: weights.into(),
        }
    }
}

/// Validated model artifacts, ready to hand to an [`crate::InferenceBackend`].
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub descriptor: ModelDescriptor,
    pub weights_path: PathBuf,
    pub weights_len: u64,
}

impl ModelArtifacts {
    /// Read the architecture descriptor and check the weights blob is usable.
    pub fn load(paths: &ModelPaths) -> Result<Self, ModelLoadError> {
        let json = fs::read_to_string(&paths.architecture).map_err(|source| ModelLoadError::Read {
            path: paths.architecture.clone(),
            source,
        })?;

        let descriptor = ModelDescriptor::from_json(&json)?;
        let weights_len = check_weights(&paths.weights)?;

        tracing::info!(
            architecture = %paths.architecture.display(),
            weights = %paths.weights.display(),
            weights_bytes = weights_len,
            layers = descriptor.layer_count,
            input_shape = ?descriptor.batch_shape(),
            output_dim = ?descriptor.output_dim(),
            "Model artifacts validated"
        );

        Ok(Self {
            descriptor,
            weights_path: paths.weights.clone(),
            weights_len,
        })
    }
}

fn check_weights(path: &Path) -> Result<u64, ModelLoadError> {
    let metadata = fs::metadata(path).map_err(|source| ModelLoadError::MissingWeights {
        path: path.to_path_buf(),
        source,
    })?;

    if !metadata.is_file() {
        return Err(ModelLoadError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    if metadata.len() == 0 {
        return Err(ModelLoadError::EmptyWeights {
            path: path.to_path_buf(),
        });
    }

    Ok(metadata.len())
}
