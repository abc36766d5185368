use opentelemetry::{
    global,
    metrics::{Counter, Histogram, MeterProvider},
    KeyValue,
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::collections::HashSet;

pub struct Metrics {
    request_counter: Counter<u64>,
    prediction_counter: Counter<u64>,
    prediction_duration: Histogram<u64>,
    // The exporter shuts down once the last provider handle is dropped.
    provider: SdkMeterProvider,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();

        let meter = provider.meter("weather_prediction");

        let request_counter = meter
            .u64_counter("requests_total")
            .with_description("Total number of requests")
            .build();

        let prediction_counter = meter
            .u64_counter("predictions_total")
            .with_description("Predictions by outcome")
            .build();

        let boundaries = generate_boundaries((10, 50, 150, 550, 2050));

        let prediction_duration = meter
            .u64_histogram("prediction_duration_ms")
            .with_boundaries(boundaries)
            .with_description("Duration of prediction operations in milliseconds")
            .build();

        Ok(Metrics {
            request_counter,
            prediction_counter,
            prediction_duration,
            provider,
            registry,
        })
    }

    /// Makes this provider the process-wide one, so the HTTP metrics layer
    /// reports into the same registry.
    pub fn install_global(&self) {
        global::set_meter_provider(self.provider.clone());
    }

    pub fn record_request(&self, route: &str) {
        let attributes = vec![KeyValue::new("route", route.to_string())];
        self.request_counter.add(1, &attributes);
    }

    pub fn record_prediction(&self, duration_ms: u64, outcome: &str) {
        let attributes = vec![KeyValue::new("outcome", outcome.to_string())];
        self.prediction_counter.add(1, &attributes);
        self.prediction_duration.record(duration_ms, &attributes);
    }
}

/// Histogram buckets: fine steps for fast CPU inference, coarser steps for
/// the slow tail.
fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 10;
    let middle_step: usize = 25;
    let end_step: usize = 100;
    let tail_step: usize = 500;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
