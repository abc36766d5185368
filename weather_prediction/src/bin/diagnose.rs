//! Deployment check: prints the resolved configuration, the model files on
//! disk and whether each model loads.

use std::{path::Path, process::ExitCode};
use weather_prediction::{
    config::{self, Config},
    labels::{ClassLabelSet, ModelMetadata},
    model_service::ModelService,
    preprocess::NormalizedTensor,
    OrtModelService,
};

fn print_section(title: &str) {
    println!("\n[{}]", title);
}

fn print_environment() {
    print_section("Environment");
    for name in ["APP_ENVIRONMENT", "PORT", "DEBUG", "RUST_LOG"] {
        let value = std::env::var(name).unwrap_or_else(|_| "Not set".to_string());
        println!("{}: {}", name, value);
    }
    match std::env::current_dir() {
        Ok(dir) => println!("CWD: {}", dir.display()),
        Err(e) => println!("CWD: unavailable ({})", e),
    }
}

fn print_model_dir(model_dir: &Path) {
    print_section("Model Directory");
    let entries = match std::fs::read_dir(model_dir) {
        Ok(entries) => entries,
        Err(e) => {
            println!("✗ {} not readable: {}", model_dir.display(), e);
            return;
        }
    };

    println!("✓ {} exists", model_dir.display());
    for entry in entries.flatten() {
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        println!(
            "  - {} ({:.2} MB)",
            entry.file_name().to_string_lossy(),
            size as f64 / 1024. / 1024.
        );
    }
}

fn print_metadata(config: &Config) -> Option<ClassLabelSet> {
    print_section("Metadata");
    let metadata = match ModelMetadata::load_optional(&config.labels) {
        Ok(metadata) => metadata,
        Err(e) => {
            println!("✗ {}", e);
            return None;
        }
    };

    match &metadata {
        Some(metadata) => {
            println!("✓ Metadata loaded");
            println!(
                "  Architecture: {}",
                metadata.architecture.as_deref().unwrap_or("unknown")
            );
            println!("  Accuracy: {:.2}%", metadata.performance.accuracy * 100.);
        }
        None => println!("⚠ No metadata, using fallback class order"),
    }

    match ClassLabelSet::resolve(metadata.as_ref(), &config.labels) {
        Ok(labels) => {
            println!("  Classes: {:?}", labels.as_slice());
            Some(labels)
        }
        Err(e) => {
            println!("✗ Invalid class labels: {}", e);
            None
        }
    }
}

/// Loads the model and returns its output width.
fn check_model(name: &str, path: &Path, config: &Config) -> Option<usize> {
    println!("{}: {}", name, path.display());
    let model = match OrtModelService::new(name, path, 1, config.model.input_layout) {
        Ok(model) => model,
        Err(e) => {
            println!("  ✗ {}", e);
            return None;
        }
    };

    match model.predict(&NormalizedTensor::zeros()) {
        Ok(scores) => {
            println!("  ✓ Loaded, output width {}", scores.len());
            Some(scores.len())
        }
        Err(e) => {
            println!("  ✗ Loaded but inference failed: {}", e);
            None
        }
    }
}

fn main() -> ExitCode {
    println!("{}", "=".repeat(70));
    println!("WEATHER PREDICTION DIAGNOSTICS");
    println!("{}", "=".repeat(70));

    print_environment();

    let config = match config::get_configuration() {
        Ok(config) => config,
        Err(e) => {
            println!("\n✗ Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    print_section("Configuration");
    println!("Address: {}", config.server.get_address());
    println!("Debug: {}", config.server.debug);
    println!("Log level: {}", config.effective_log_level().as_str());
    println!("Input layout: {:?}", config.model.input_layout);

    print_model_dir(&config.model.model_dir);
    let labels = print_metadata(&config);

    print_section("Model Loading Test");
    let weather_width = check_model("weather", &config.model.get_weather_path(), &config);
    match (weather_width, &labels) {
        (Some(width), Some(labels)) if width != labels.len() => {
            println!("  ✗ {} classes configured but the model has {} outputs", labels.len(), width)
        }
        _ => {}
    }

    match (&config.model.sky_detector, config.model.get_sky_detector_path()) {
        (Some(sky_cfg), Some(path)) => {
            check_model("sky_detector", &path, &config);
            println!(
                "  Threshold {:.2}, sky class index {}",
                sky_cfg.confidence_threshold, sky_cfg.sky_class_index
            );
        }
        _ => println!("sky_detector: not configured, sky validation disabled"),
    }

    println!("\n{}", "=".repeat(70));
    println!("DIAGNOSTICS COMPLETE");
    println!("{}", "=".repeat(70));

    if weather_width.is_some() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
