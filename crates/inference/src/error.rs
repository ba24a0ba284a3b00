use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Startup failures while reading or building the model. All of them are fatal.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("Failed to read architecture descriptor {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Weights file {path} is not accessible: {source}")]
    MissingWeights {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Weights path {path} is not a regular file")]
    NotAFile { path: PathBuf },

    #[error("Weights file {path} is empty")]
    EmptyWeights { path: PathBuf },

    #[error("Architecture descriptor is not valid JSON: {0}")]
    InvalidDescriptor(#[from] serde_json::Error),

    #[error("Invalid model architecture: {0}")]
    InvalidArchitecture(String),

    #[error("Inference runtime rejected the model: {0}")]
    Runtime(String),
}

/// Failures of a single forward pass.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Input batch has shape {actual:?}, model expects {expected:?}")]
    InputShape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Inference runtime error: {0}")]
    Runtime(String),

    #[error("Model produced an empty output")]
    EmptyOutput,

    #[error("Model produced {actual} scores per sample, architecture declares {expected}")]
    OutputShape { expected: usize, actual: usize },
}
