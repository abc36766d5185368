use super::timestamp;
use crate::{model_service::ModelService, server::SharedState};
use axum::{
    extract::State,
    response::{IntoResponse, Json},
};
use serde::Serialize;

#[derive(Serialize)]
pub struct ServiceStatus {
    status: &'static str,
    message: &'static str,
    model_loaded: bool,
    version: &'static str,
    timestamp: String,
}

pub async fn status<M: ModelService>(State(state): State<SharedState<M>>) -> impl IntoResponse {
    state.metrics.record_request("/");
    Json(ServiceStatus {
        status: "online",
        message: "Weather Prediction API is running",
        model_loaded: state.pipeline.is_weather_model_loaded(),
        version: env!("CARGO_PKG_VERSION"),
        timestamp: timestamp(),
    })
}

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    model_status: &'static str,
    sky_detector_status: &'static str,
    timestamp: String,
}

pub async fn healthcheck<M: ModelService>(
    State(state): State<SharedState<M>>,
) -> impl IntoResponse {
    state.metrics.record_request("/api/health");
    let model_status = if state.pipeline.is_weather_model_loaded() {
        "loaded"
    } else {
        "not_loaded"
    };
    let sky_detector_status = if state.pipeline.is_sky_gate_enabled() {
        "enabled"
    } else {
        "disabled"
    };

    Json(Health {
        status: "healthy",
        model_status,
        sky_detector_status,
        timestamp: timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use crate::pipeline::tests::MockModelService;
    use crate::routes::tests::{app, get_request, send};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_status_reports_model_state() {
        let (status, body) = send(
            app(Some(MockModelService::new(vec![0.5, 0.5])), None, None),
            get_request("/"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "online");
        assert_eq!(body["model_loaded"], true);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_healthcheck_reports_not_loaded() {
        let (status, body) = send(app(None, None, None), get_request("/api/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model_status"], "not_loaded");
        assert_eq!(body["sky_detector_status"], "disabled");
    }

    #[tokio::test]
    async fn test_healthcheck_reports_sky_detector() {
        let (_, body) = send(
            app(
                Some(MockModelService::new(vec![0.5, 0.5])),
                Some(MockModelService::new(vec![0.1, 0.9])),
                None,
            ),
            get_request("/api/health"),
        )
        .await;

        assert_eq!(body["model_status"], "loaded");
        assert_eq!(body["sky_detector_status"], "enabled");
    }
}
