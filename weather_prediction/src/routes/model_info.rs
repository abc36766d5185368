use super::{ErrorBody, SuccessBody};
use crate::{model_service::ModelService, server::SharedState};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

#[derive(Serialize)]
pub struct ModelInfo {
    architecture: Option<String>,
    classes: Vec<String>,
    accuracy: f64,
    precision: f64,
    recall: f64,
    f1_score: f64,
    training_date: Option<String>,
}

pub async fn model_info<M: ModelService>(State(state): State<SharedState<M>>) -> Response {
    state.metrics.record_request("/api/model-info");

    let Some(metadata) = state.metadata.as_deref() else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorBody::new("Model metadata is not available")),
        )
            .into_response();
    };

    let info = ModelInfo {
        architecture: metadata.architecture.clone(),
        classes: state.pipeline.labels().as_slice().to_vec(),
        accuracy: metadata.performance.accuracy,
        precision: metadata.performance.precision,
        recall: metadata.performance.recall,
        f1_score: metadata.performance.f1_score,
        training_date: metadata.timestamp.clone(),
    };

    Json(SuccessBody::new(info)).into_response()
}

#[cfg(test)]
mod tests {
    use crate::pipeline::tests::MockModelService;
    use crate::routes::tests::{app, get_request, metadata, send};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_model_info_without_metadata_is_404() {
        let (status, body) = send(
            app(Some(MockModelService::new(vec![0.5, 0.5])), None, None),
            get_request("/api/model-info"),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_model_info_surfaces_metadata() {
        let (status, body) = send(
            app(
                Some(MockModelService::new(vec![0.5, 0.5])),
                None,
                Some(metadata()),
            ),
            get_request("/api/model-info"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["architecture"], "MobileNetV2");
        assert_eq!(body["data"]["classes"][1], "hujan");
        assert_eq!(body["data"]["accuracy"], 0.93);
        assert_eq!(body["data"]["f1_score"], 0.93);
        assert_eq!(body["data"]["training_date"], "20251217_141415");
    }
}
