mod ort_service;
mod routes;
mod server;
mod telemetry;

pub mod app;
pub mod config;
pub mod labels;
pub mod model_service;
pub mod pipeline;
pub mod preprocess;

pub use app::{build_state, start_app};
pub use ort_service::OrtModelService;
