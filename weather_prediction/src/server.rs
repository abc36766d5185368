use crate::{
    config::ServerConfig, labels::ModelMetadata, model_service::ModelService,
    pipeline::InferencePipeline, routes::api_routes, telemetry::Metrics,
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Read-only context shared by every handler.
pub struct SharedState<M: ModelService> {
    pub pipeline: Arc<InferencePipeline<M>>,
    pub metadata: Option<Arc<ModelMetadata>>,
    pub metrics: Arc<Metrics>,
}

impl<M: ModelService> Clone for SharedState<M> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            metadata: self.metadata.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

pub fn router<M: ModelService>(state: SharedState<M>, server_config: &ServerConfig) -> Router {
    let metrics_layer = HttpMetricsLayerBuilder::new().build();

    api_routes()
        .with_state(state)
        .layer(DefaultBodyLimit::max(server_config.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(metrics_layer)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<M: ModelService>(
        state: SharedState<M>,
        server_config: &ServerConfig,
    ) -> anyhow::Result<Self> {
        let addr = server_config.get_address();
        let router = router(state, server_config);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
