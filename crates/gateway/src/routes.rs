use crate::error::PredictError;
use crate::state::AppState;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, State,
        multipart::{Multipart, MultipartRejection},
    },
    response::Redirect,
    routing::{any, get, post},
};
use inference::{InferenceBackend, PredictionVector};
use serde::{Deserialize, Serialize};
use std::sync::PoisonError;
use std::time::Instant;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

const FILE_FIELD: &str = "file";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictResponse {
    /// Raw model output: one row per batch element
    pub prediction: Vec<PredictionVector>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

/// Build the HTTP router around an already-loaded model.
pub fn router<B: InferenceBackend>(state: AppState<B>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/predict/", post(predict::<B>))
        .route("/predict", any(redirect_to_predict))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

/// Any origin, method and header, with credentials. Origins are mirrored
/// since a wildcard cannot be combined with credentials.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// 307 keeps the method and body, so clients retry the upload on the canonical path.
async fn redirect_to_predict() -> Redirect {
    Redirect::temporary("/predict/")
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn predict<B: InferenceBackend>(
    State(state): State<AppState<B>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, PredictError> {
    let start = Instant::now();

    let result = run_prediction(&state, multipart).await;

    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.outcome(),
    };
    state.metrics.record(start.elapsed(), outcome);

    result.map(Json)
}

async fn run_prediction<B: InferenceBackend>(
    state: &AppState<B>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<PredictResponse, PredictError> {
    let upload = read_upload(multipart?).await?;

    let model = state.model.clone();
    let preprocessor = state.preprocessor;
    let upload_bytes = upload.len();

    let prediction = tokio::task::spawn_blocking(move || -> Result<_, PredictError> {
        let input = preprocessor.preprocess(&upload)?;

        tracing::debug!(
            width = input.original_size.0,
            height = input.original_size.1,
            color = ?input.original_color,
            "Preprocessed upload"
        );

        // A panicked forward pass leaves the model untouched
        let mut model = model.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(model.predict(&input.tensor)?)
    })
    .await??;

    tracing::debug!(
        upload_bytes,
        scores = prediction.first().map(Vec::len).unwrap_or(0),
        "Prediction served"
    );

    Ok(PredictResponse { prediction })
}

/// Take the file part named `file`, or failing that the first part carrying a file name.
async fn read_upload(mut multipart: Multipart) -> Result<Bytes, PredictError> {
    let mut fallback = None;

    while let Some(field) = multipart.next_field().await? {
        // Plain form values are never uploads, whatever their name
        if field.file_name().is_none() {
            continue;
        }

        if field.name() == Some(FILE_FIELD) {
            return Ok(field.bytes().await?);
        }

        if fallback.is_none() {
            fallback = Some(field.bytes().await?);
        }
    }

    fallback.ok_or(PredictError::MissingFile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
    use inference::{
        BackendOptions, InferenceError, Model, ModelArtifacts, ModelDescriptor, ModelLoadError,
    };
    use ndarray::{Array, ArrayD, IxDyn};
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    const BOUNDARY: &str = "predict-test-boundary";
    const CLASSES: usize = 4;
    const LIMIT: usize = 16 * 1024 * 1024;

    /// Deterministic stand-in for the classifier: scores scale with mean brightness
    struct MeanBackend {
        seen: Arc<Mutex<Vec<Vec<usize>>>>,
    }

    impl InferenceBackend for MeanBackend {
        fn load_model(
            _artifacts: &ModelArtifacts,
            _options: &BackendOptions,
        ) -> Result<Self, ModelLoadError> {
            Ok(Self {
                seen: Arc::default(),
            })
        }

        fn infer(&mut self, batch: &Array<f32, IxDyn>) -> Result<ArrayD<f32>, InferenceError> {
            self.seen.lock().unwrap().push(batch.shape().to_vec());
            let mean = batch.mean().unwrap_or(0.0) / 255.0;
            Ok(ArrayD::from_shape_fn(IxDyn(&[1, CLASSES]), |ix| {
                mean * (ix[1] + 1) as f32
            }))
        }
    }

    struct FailingBackend;

    impl InferenceBackend for FailingBackend {
        fn load_model(
            _artifacts: &ModelArtifacts,
            _options: &BackendOptions,
        ) -> Result<Self, ModelLoadError> {
            Ok(Self)
        }

        fn infer(&mut self, _batch: &Array<f32, IxDyn>) -> Result<ArrayD<f32>, InferenceError> {
            Err(InferenceError::Runtime("out of memory".to_string()))
        }
    }

    fn descriptor() -> ModelDescriptor {
        ModelDescriptor::from_json(&format!(
            r#"{{"class_name": "Functional", "config": {{"layers": [
                {{"class_name": "InputLayer", "config": {{"batch_input_shape": [null, 224, 224, 3]}}}},
                {{"class_name": "Dense", "config": {{"units": {}}}}}
            ]}}}}"#,
            CLASSES
        ))
        .unwrap()
    }

    fn app_with<B: InferenceBackend>(backend: B, limit: usize) -> Router {
        router(AppState::new(Model::new(backend, descriptor())), limit)
    }

    fn mean_app() -> (Router, Arc<Mutex<Vec<Vec<usize>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let app = app_with(MeanBackend { seen: seen.clone() }, LIMIT);
        (app, seen)
    }

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, format).unwrap();
        bytes.into_inner()
    }

    fn red_square_png() -> Vec<u8> {
        encode(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([255, 0, 0]))),
            ImageFormat::Png,
        )
    }

    /// One-part multipart body; `filename: None` makes it a plain form field
    fn multipart_body(field: &str, filename: Option<&str>, data: &[u8]) -> Vec<u8> {
        let disposition = match filename {
            Some(filename) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, filename
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", field),
        };

        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn predict_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/predict/")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_predict_red_square() {
        let (app, seen) = mean_app();

        let response = app
            .oneshot(predict_request(multipart_body(
                "file",
                Some("red.png"),
                &red_square_png(),
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );

        let body: PredictResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body.prediction.len(), 1, "One row for the single-image batch");
        assert_eq!(body.prediction[0].len(), CLASSES);
        assert!(body.prediction[0].iter().all(|v| v.is_finite()));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![vec![1, 224, 224, 3]],
            "Model should receive a (1, 224, 224, 3) batch"
        );
    }

    #[tokio::test]
    async fn test_prediction_json_is_nested_array() {
        let (app, _) = mean_app();

        let response = app
            .oneshot(predict_request(multipart_body(
                "file",
                Some("red.png"),
                &red_square_png(),
            )))
            .await
            .unwrap();

        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        let rows = json["prediction"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_array().unwrap().len(), CLASSES);
        assert!(rows[0].as_array().unwrap().iter().all(|v| v.is_f64()));
    }

    #[tokio::test]
    async fn test_non_image_payload_is_server_fault() {
        let (app, seen) = mean_app();

        let response = app
            .oneshot(predict_request(multipart_body(
                "file",
                Some("notes.txt"),
                b"not an image",
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_bytes(response).await, b"Internal Server Error");
        assert!(seen.lock().unwrap().is_empty(), "Model must not run");
    }

    #[tokio::test]
    async fn test_inference_failure_is_server_fault() {
        let app = app_with(FailingBackend, LIMIT);

        let response = app
            .oneshot(predict_request(multipart_body(
                "file",
                Some("red.png"),
                &red_square_png(),
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_bytes(response).await;
        assert!(!String::from_utf8_lossy(&body).contains("out of memory"));
    }

    #[tokio::test]
    async fn test_identical_requests_give_identical_bytes() {
        let (app, _) = mean_app();
        let img = RgbImage::from_fn(31, 17, |x, y| Rgb([(x * 8) as u8, (y * 15) as u8, 77]));
        let body = multipart_body("file", Some("gradient.png"), &encode(
            DynamicImage::ImageRgb8(img),
            ImageFormat::Png,
        ));

        let first = app.clone().oneshot(predict_request(body.clone())).await.unwrap();
        let second = app.oneshot(predict_request(body)).await.unwrap();

        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(body_bytes(first).await, body_bytes(second).await);
    }

    #[tokio::test]
    async fn test_grayscale_upload_reaches_model_with_three_channels() {
        let (app, seen) = mean_app();
        let gray = encode(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(64, 48, Luma([200]))),
            ImageFormat::Png,
        );

        let response = app
            .oneshot(predict_request(multipart_body("file", Some("xray.png"), &gray)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(seen.lock().unwrap()[0][3], 3);
    }

    #[tokio::test]
    async fn test_file_part_under_another_name_is_accepted() {
        let (app, _) = mean_app();

        let response = app
            .oneshot(predict_request(multipart_body(
                "image",
                Some("red.png"),
                &red_square_png(),
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_file_part_is_unprocessable() {
        let (app, _) = mean_app();

        let response = app
            .oneshot(predict_request(multipart_body("note", None, b"hello")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_plain_file_field_without_filename_is_unprocessable() {
        let (app, seen) = mean_app();

        let response = app
            .oneshot(predict_request(multipart_body("file", None, b"hello")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(seen.lock().unwrap().is_empty(), "Model must not run");
    }

    #[tokio::test]
    async fn test_path_without_trailing_slash_redirects() {
        let (app, seen) = mean_app();

        let mut request = predict_request(multipart_body("file", Some("red.png"), &red_square_png()));
        *request.uri_mut() = "/predict".parse().unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers()[header::LOCATION], "/predict/");
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_multipart_request_is_rejected() {
        let (app, _) = mean_app();

        let request = Request::builder()
            .method("POST")
            .uri("/predict/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected() {
        let app = app_with(
            MeanBackend {
                seen: Arc::default(),
            },
            1024,
        );

        let response = app
            .oneshot(predict_request(multipart_body(
                "file",
                Some("big.bin"),
                &vec![0u8; 8 * 1024],
            )))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_cors_preflight_from_arbitrary_origin() {
        let (app, _) = mean_app();

        let request = Request::builder()
            .method("OPTIONS")
            .uri("/predict/")
            .header(header::ORIGIN, "https://viewer.example.org")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-requested-with")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let headers = response.headers();

        assert!(response.status().is_success());
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://viewer.example.org"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "x-requested-with"
        );
    }

    #[tokio::test]
    async fn test_cors_headers_on_prediction() {
        let (app, _) = mean_app();

        let mut request = predict_request(multipart_body("file", Some("red.png"), &red_square_png()));
        request
            .headers_mut()
            .insert(header::ORIGIN, "http://localhost:3000".parse().unwrap());

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = mean_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: HealthResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body.status, "ok");
    }
}
