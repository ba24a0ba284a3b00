use crate::metrics::PredictMetrics;
use inference::{InferenceBackend, Model};
use preprocess::ImagePreprocessor;
use std::sync::{Arc, Mutex};

/// Shared per-process state. The model is loaded once before serving and
/// injected here, never looked up globally.
pub struct AppState<B: InferenceBackend> {
    pub model: Arc<Mutex<Model<B>>>,
    pub preprocessor: ImagePreprocessor,
    pub metrics: PredictMetrics,
}

impl<B: InferenceBackend> AppState<B> {
    pub fn new(model: Model<B>) -> Self {
        let preprocessor = ImagePreprocessor::new(model.input_size());
        Self {
            model: Arc::new(Mutex::new(model)),
            preprocessor,
            metrics: PredictMetrics::new("gateway"),
        }
    }
}

impl<B: InferenceBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            preprocessor: self.preprocessor,
            metrics: self.metrics.clone(),
        }
    }
}
