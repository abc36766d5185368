use super::{timestamp, ErrorBody, RejectionDetail, SuccessBody};
use crate::{
    model_service::ModelService,
    pipeline::{ClassifyOutcome, PipelineError, PredictionResult},
    preprocess::DecodeError,
    server::SharedState,
};
use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use indexmap::IndexMap;
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

const IMAGE_FIELD: &str = "image";
const SKY_SUGGESTION: &str = "Please upload a photo of the sky or clouds to get a weather prediction";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Weather model is not loaded")]
    ModelUnavailable,
    #[error("No image file was uploaded")]
    MissingImage,
    #[error("Image filename is empty")]
    EmptyFilename,
    #[error("Uploaded image is empty")]
    EmptyImage,
    #[error("Invalid multipart request: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Invalid multipart request: {0}")]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Invalid image: {0}")]
    Decode(DecodeError),
    #[error("The uploaded image is not a sky image")]
    NotSky { sky_confidence: f64 },
    #[error("Prediction failed: {0}")]
    Internal(String),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::ModelUnavailable => ApiError::ModelUnavailable,
            PipelineError::Decode(e) => ApiError::Decode(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ModelUnavailable | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Multipart(e) => e.status(),
            ApiError::MultipartRejection(e) => e.status(),
            ApiError::MissingImage
            | ApiError::EmptyFilename
            | ApiError::EmptyImage
            | ApiError::Decode(_)
            | ApiError::NotSky { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            ApiError::NotSky { sky_confidence } => {
                ErrorBody::new(self.to_string()).with_detail(RejectionDetail {
                    is_sky: false,
                    sky_confidence: *sky_confidence,
                    suggestion: SKY_SUGGESTION,
                })
            }
            _ => ErrorBody::new(self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize, Debug)]
pub struct Validation {
    is_sky_image: bool,
    sky_confidence: f64,
}

#[derive(Serialize, Debug)]
pub struct PredictionData {
    prediction: String,
    confidence: f64,
    probabilities: IndexMap<String, f64>,
    is_rain: bool,
    validation: Validation,
    timestamp: String,
}

impl PredictionData {
    fn new(prediction: PredictionResult, sky_confidence: f64) -> Self {
        Self {
            prediction: prediction.label,
            confidence: prediction.confidence,
            probabilities: prediction.probabilities,
            is_rain: prediction.is_rain,
            validation: Validation {
                is_sky_image: true,
                sky_confidence,
            },
            timestamp: timestamp(),
        }
    }
}

/// Pulls the `image` file part out of the form. Parts without a filename
/// are not file uploads and are skipped.
async fn read_image_field(mut multipart: Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let empty_filename = match field.file_name() {
            Some(name) => name.is_empty(),
            None => continue,
        };
        if empty_filename {
            return Err(ApiError::EmptyFilename);
        }

        let image_data = field.bytes().await?;
        if image_data.is_empty() {
            return Err(ApiError::EmptyImage);
        }
        return Ok(image_data);
    }

    Err(ApiError::MissingImage)
}

#[instrument(skip(state, multipart))]
pub async fn predict<M: ModelService>(
    State(state): State<SharedState<M>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    state.metrics.record_request("/api/predict");

    if !state.pipeline.is_weather_model_loaded() {
        tracing::error!("Prediction failed: weather model not loaded");
        return Err(ApiError::ModelUnavailable);
    }

    let image_data = read_image_field(multipart?).await?;

    let started = Instant::now();
    let pipeline = state.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || pipeline.classify(&image_data))
        .await
        .map_err(|e| ApiError::Internal(format!("inference worker failed: {}", e)))?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(ClassifyOutcome::Success {
            prediction,
            sky_confidence,
        }) => {
            state.metrics.record_prediction(elapsed_ms, "success");
            let data = PredictionData::new(prediction, sky_confidence);
            Ok(Json(SuccessBody::new(data)).into_response())
        }
        Ok(ClassifyOutcome::SkyRejected { sky_confidence }) => {
            state.metrics.record_prediction(elapsed_ms, "sky_rejected");
            Err(ApiError::NotSky { sky_confidence })
        }
        Err(e) => {
            state.metrics.record_prediction(elapsed_ms, "error");
            tracing::error!("Prediction error: {}", e);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::pipeline::tests::{png_bytes, MockModelService};
    use crate::routes::tests::{app, multipart_body, predict_request, send};
    use axum::{body::Body, http::Request, http::StatusCode};

    #[tokio::test]
    async fn test_predict_rain() {
        let weather = MockModelService::new(vec![0.2, 0.9]);
        let (status, body) = send(
            app(Some(weather), None, None),
            predict_request(multipart_body("image", Some("sky.png"), &png_bytes())),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        let data = &body["data"];
        assert_eq!(data["prediction"], "hujan");
        assert_eq!(data["confidence"], 90.0);
        assert_eq!(data["is_rain"], true);
        assert_eq!(data["probabilities"]["tidak_hujan"], 20.0);
        assert_eq!(data["probabilities"]["hujan"], 90.0);
        assert_eq!(data["validation"]["is_sky_image"], true);
        assert_eq!(data["validation"]["sky_confidence"], 100.0);
        assert!(data["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_predict_sky_rejection() {
        let weather = MockModelService::new(vec![0.2, 0.9]);
        let sky = MockModelService::new(vec![0.8, 0.2]);
        let (status, body) = send(
            app(Some(weather.clone()), Some(sky), None),
            predict_request(multipart_body("image", Some("cat.png"), &png_bytes())),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert_eq!(body["detail"]["is_sky"], false);
        assert_eq!(body["detail"]["sky_confidence"], 80.0);
        assert!(body["detail"]["suggestion"].is_string());
        assert_eq!(weather.call_count(), 0);
    }

    #[tokio::test]
    async fn test_predict_with_confident_sky_reports_validation() {
        let weather = MockModelService::new(vec![0.7, 0.3]);
        let sky = MockModelService::new(vec![0.1, 0.9]);
        let (status, body) = send(
            app(Some(weather), Some(sky), None),
            predict_request(multipart_body("image", Some("sky.jpg"), &png_bytes())),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["prediction"], "tidak_hujan");
        assert_eq!(body["data"]["is_rain"], false);
        assert_eq!(body["data"]["validation"]["sky_confidence"], 90.0);
    }

    #[tokio::test]
    async fn test_missing_image_field_skips_inference() {
        let weather = MockModelService::new(vec![0.2, 0.9]);
        let sky = MockModelService::new(vec![0.1, 0.9]);
        let (status, body) = send(
            app(Some(weather.clone()), Some(sky.clone()), None),
            predict_request(multipart_body("photo", Some("sky.png"), &png_bytes())),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert_eq!(weather.call_count(), 0);
        assert_eq!(sky.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_filename_skips_inference() {
        let weather = MockModelService::new(vec![0.2, 0.9]);
        let sky = MockModelService::new(vec![0.1, 0.9]);
        let (status, body) = send(
            app(Some(weather.clone()), Some(sky.clone()), None),
            predict_request(multipart_body("image", Some(""), &png_bytes())),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert_eq!(weather.call_count(), 0);
        assert_eq!(sky.call_count(), 0);
    }

    #[tokio::test]
    async fn test_non_file_image_field_counts_as_missing() {
        let weather = MockModelService::new(vec![0.2, 0.9]);
        let (status, body) = send(
            app(Some(weather.clone()), None, None),
            predict_request(multipart_body("image", None, b"just text")),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No image file was uploaded");
        assert_eq!(weather.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_upload_is_rejected() {
        let weather = MockModelService::new(vec![0.2, 0.9]);
        let (status, _) = send(
            app(Some(weather.clone()), None, None),
            predict_request(multipart_body("image", Some("sky.png"), b"")),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(weather.call_count(), 0);
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_a_decode_error() {
        let weather = MockModelService::new(vec![0.2, 0.9]);
        let (status, body) = send(
            app(Some(weather.clone()), None, None),
            predict_request(multipart_body("image", Some("sky.png"), b"\x00\x01garbage")),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().starts_with("Invalid image"));
        assert_eq!(weather.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unloaded_model_returns_500() {
        let (status, body) = send(
            app(None, None, None),
            predict_request(multipart_body("image", Some("sky.png"), &png_bytes())),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Weather model is not loaded");

        let (status, _) = send(
            app(None, None, None),
            predict_request(multipart_body("photo", None, b"")),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_weather_inference_failure_returns_500() {
        let weather = MockModelService::failing();
        let (status, body) = send(
            app(Some(weather.clone()), None, None),
            predict_request(multipart_body("image", Some("sky.png"), &png_bytes())),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Prediction failed"));
        assert!(body.get("detail").is_none());
        assert_eq!(weather.call_count(), 1);
    }

    #[tokio::test]
    async fn test_sky_detector_failure_returns_500_without_weather_call() {
        let weather = MockModelService::new(vec![0.2, 0.9]);
        let sky = MockModelService::failing();
        let (status, body) = send(
            app(Some(weather.clone()), Some(sky.clone()), None),
            predict_request(multipart_body("image", Some("sky.png"), &png_bytes())),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert_eq!(sky.call_count(), 1);
        assert_eq!(weather.call_count(), 0);
    }

    #[tokio::test]
    async fn test_non_multipart_request_is_rejected() {
        let weather = MockModelService::new(vec![0.2, 0.9]);
        let request = Request::builder()
            .method("POST")
            .uri("/api/predict")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let (status, body) = send(app(Some(weather.clone()), None, None), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert_eq!(weather.call_count(), 0);
    }
}
