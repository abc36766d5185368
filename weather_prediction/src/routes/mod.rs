mod health;
mod metrics;
mod model_info;
mod predict;

use crate::{model_service::ModelService, server::SharedState};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/", get(health::status::<M>))
        .route("/api/health", get(health::healthcheck::<M>))
        .route("/api/model-info", get(model_info::model_info::<M>))
        .route("/api/predict", post(predict::predict::<M>))
        .route("/metrics", get(metrics::metrics_handler::<M>))
        .fallback(not_found)
}

#[derive(Serialize, Debug)]
pub struct SuccessBody<T: Serialize> {
    status: &'static str,
    data: T,
}

impl<T: Serialize> SuccessBody<T> {
    pub fn new(data: T) -> Self {
        Self {
            status: "success",
            data,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<RejectionDetail>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: RejectionDetail) -> Self {
        self.detail = Some(detail);
        self
    }
}

#[derive(Serialize, Debug)]
pub struct RejectionDetail {
    pub is_sky: bool,
    pub sky_confidence: f64,
    pub suggestion: &'static str,
}

pub fn timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody::new("Endpoint not found")),
    )
        .into_response()
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::{
        config::ServerConfig,
        labels::{ClassLabelSet, ModelMetadata, Performance},
        pipeline::{tests::MockModelService, InferencePipeline, SkyGate},
        server::{router, SharedState},
        telemetry::Metrics,
    };
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    pub const BOUNDARY: &str = "weather-test-boundary";

    pub fn server_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            debug: false,
            max_upload_bytes: 1024 * 1024,
        }
    }

    pub fn metadata() -> ModelMetadata {
        ModelMetadata {
            architecture: Some("MobileNetV2".to_string()),
            classes: Some(vec!["tidak_hujan".to_string(), "hujan".to_string()]),
            performance: Performance {
                accuracy: 0.93,
                precision: 0.92,
                recall: 0.94,
                f1_score: 0.93,
            },
            timestamp: Some("20251217_141415".to_string()),
        }
    }

    pub fn app(
        weather: Option<MockModelService>,
        sky: Option<MockModelService>,
        metadata: Option<ModelMetadata>,
    ) -> Router {
        let labels =
            ClassLabelSet::new(vec!["tidak_hujan".to_string(), "hujan".to_string()]).unwrap();
        let sky_gate = sky.map(|model| SkyGate::new(model, 0.70, 1));
        let state = SharedState {
            pipeline: Arc::new(InferencePipeline::new(weather, sky_gate, labels)),
            metadata: metadata.map(Arc::new),
            metrics: Arc::new(Metrics::new().unwrap()),
        };
        router(state, &server_config())
    }

    /// Builds a multipart body with a single part.
    pub fn multipart_body(field: &str, file_name: Option<&str>, data: &[u8]) -> Vec<u8> {
        let disposition = match file_name {
            Some(name) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/png\r\n",
                field, name
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", field),
        };
        let mut body = format!("--{}\r\n{}\r\n", BOUNDARY, disposition).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    pub fn predict_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/predict")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    pub fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_unknown_route_returns_json_404() {
        let (status, body) = send(app(None, None, None), get_request("/nope")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Endpoint not found");
    }
}
