use axum::{
    Json,
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use inference::InferenceError;
use preprocess::PreprocessError;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("Request is not a readable multipart body: {0}")]
    Multipart(#[from] MultipartRejection),

    #[error("Failed to read upload: {0}")]
    Upload(#[from] MultipartError),

    #[error("No file part in upload")]
    MissingFile,

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("Prediction task failed: {0}")]
    Worker(#[from] JoinError),
}

impl PredictError {
    /// Label used for the `outcome` metric attribute
    pub fn outcome(&self) -> &'static str {
        match self {
            PredictError::Multipart(_) | PredictError::Upload(_) => "bad_upload",
            PredictError::MissingFile => "missing_file",
            PredictError::Preprocess(e) if e.is_decode() => "decode_error",
            PredictError::Preprocess(_) => "preprocess_error",
            PredictError::Inference(_) => "inference_error",
            PredictError::Worker(_) => "worker_error",
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        match self {
            PredictError::Multipart(rejection) => {
                tracing::warn!(error = %rejection, "Rejected upload");
                rejection.into_response()
            }
            PredictError::Upload(e) => {
                tracing::warn!(error = %e, "Failed to read upload");
                e.into_response()
            }
            PredictError::MissingFile => {
                tracing::warn!("Upload has no file part");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(json!({
                        "detail": [{
                            "type": "missing",
                            "loc": ["body", "file"],
                            "msg": "Field required",
                            "input": null
                        }]
                    })),
                )
                    .into_response()
            }
            // Decode and inference faults stay opaque to the client
            other => {
                tracing::error!(error = %other, outcome = other.outcome(), "Prediction failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}
