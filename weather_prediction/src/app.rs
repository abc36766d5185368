use crate::{
    config::{Config, ModelConfig},
    labels::{ClassLabelSet, LabelError, ModelMetadata},
    ort_service::OrtModelService,
    pipeline::{InferencePipeline, PipelineError, SkyGate},
    server::{HttpServer, SharedState},
    telemetry::Metrics,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("failed to resolve class labels: {0}")]
    Labels(#[from] LabelError),
    #[error("model validation failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("failed to start service: {0}")]
    Service(#[from] anyhow::Error),
}

/// Loads the weather model. A failure is logged and leaves the service
/// running without it, so every prediction reports the model as unavailable.
fn load_weather_model(model_cfg: &ModelConfig) -> Option<OrtModelService> {
    match OrtModelService::new(
        "weather",
        &model_cfg.get_weather_path(),
        model_cfg.num_instances,
        model_cfg.input_layout,
    ) {
        Ok(model) => Some(model),
        Err(e) => {
            tracing::error!("Error loading weather model: {}", e);
            None
        }
    }
}

/// Loads the optional sky detector. Without it the sky gate is skipped.
fn load_sky_gate(model_cfg: &ModelConfig) -> Option<SkyGate<OrtModelService>> {
    let (Some(sky_cfg), Some(path)) = (&model_cfg.sky_detector, model_cfg.get_sky_detector_path())
    else {
        tracing::warn!("No sky detector configured, skipping sky validation");
        return None;
    };

    match OrtModelService::new(
        "sky_detector",
        &path,
        model_cfg.num_instances,
        model_cfg.input_layout,
    ) {
        Ok(model) => Some(SkyGate::from_config(model, sky_cfg)),
        Err(e) => {
            tracing::warn!("Sky detector failed to load, skipping sky validation: {}", e);
            None
        }
    }
}

/// Builds the immutable request context: metadata, label set and models,
/// with model output widths checked against the label set.
pub fn build_state(config: &Config) -> Result<SharedState<OrtModelService>, StartupError> {
    let metadata = ModelMetadata::load_optional(&config.labels)?;
    let labels = ClassLabelSet::resolve(metadata.as_ref(), &config.labels)?;
    tracing::info!(classes = ?labels.as_slice(), "Resolved class labels");

    let weather = load_weather_model(&config.model);
    let sky_gate = load_sky_gate(&config.model);

    let pipeline = InferencePipeline::new(weather, sky_gate, labels);
    pipeline.verify_output_widths()?;

    let metrics = Metrics::new()?;
    metrics.install_global();

    Ok(SharedState {
        pipeline: Arc::new(pipeline),
        metadata: metadata.map(Arc::new),
        metrics: Arc::new(metrics),
    })
}

pub async fn start_app(config: Config) -> Result<(), StartupError> {
    let state = match build_state(&config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to initialize inference pipeline: {}", e);
            return Err(e);
        }
    };

    tracing::info!(
        port = config.server.port,
        debug = config.server.debug,
        weather_model_loaded = state.pipeline.is_weather_model_loaded(),
        sky_gate_enabled = state.pipeline.is_sky_gate_enabled(),
        "Starting weather prediction service"
    );

    let server = HttpServer::new(state, &config.server).await?;
    server
        .run(async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown.");
        })
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
