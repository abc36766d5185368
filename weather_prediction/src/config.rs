use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub model: ModelConfig,
    pub labels: LabelsConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

impl Config {
    /// Log level after the `debug` switch has been applied.
    pub fn effective_log_level(&self) -> LogLevel {
        if self.server.debug {
            LogLevel::Debug
        } else {
            self.log_level.clone()
        }
    }
}

pub trait Validatable {
    fn validate(&self) -> Result<(), String>;
}

impl Validatable for Config {
    fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.model.validate()?;
        self.labels.validate()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Validatable for ServerConfig {
    fn validate(&self) -> Result<(), String> {
        if self.max_upload_bytes == 0 {
            return Err("server.max_upload_bytes must be greater than zero".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub model_dir: PathBuf,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default)]
    pub input_layout: InputLayout,
    pub weather: ModelFileConfig,
    #[serde(default)]
    pub sky_detector: Option<SkyDetectorConfig>,
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

impl ModelConfig {
    pub fn get_weather_path(&self) -> PathBuf {
        self.model_dir.join(&self.weather.onnx_file)
    }

    pub fn get_sky_detector_path(&self) -> Option<PathBuf> {
        self.sky_detector
            .as_ref()
            .map(|sky| self.model_dir.join(&sky.onnx_file))
    }
}

impl Validatable for ModelConfig {
    fn validate(&self) -> Result<(), String> {
        if self.num_instances == 0 {
            return Err("model.num_instances must be at least 1".into());
        }
        if let Some(sky) = &self.sky_detector {
            sky.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelFileConfig {
    pub onnx_file: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SkyDetectorConfig {
    pub onnx_file: String,
    #[serde(default = "default_sky_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_sky_class_index")]
    pub sky_class_index: usize,
}

fn default_sky_confidence_threshold() -> f32 {
    0.70
}

fn default_sky_class_index() -> usize {
    1
}

impl Validatable for SkyDetectorConfig {
    fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "model.sky_detector.confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        Ok(())
    }
}

/// Memory layout the exported model expects for its image input.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// `[1, 224, 224, 3]`, the layout of Keras exports.
    #[default]
    Nhwc,
    /// `[1, 3, 224, 224]`
    Nchw,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LabelsConfig {
    #[serde(default)]
    pub metadata_file: Option<PathBuf>,
    #[serde(default = "default_fallback_labels")]
    pub fallback: Vec<String>,
}

fn default_fallback_labels() -> Vec<String> {
    vec!["tidak_hujan".to_string(), "hujan".to_string()]
}

impl Validatable for LabelsConfig {
    fn validate(&self) -> Result<(), String> {
        if self.fallback.is_empty() {
            return Err("labels.fallback must name at least one class".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir().map_err(|e| {
        config::ConfigError::Message(format!("failed to determine the current directory: {}", e))
    })?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let builder = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        );

    let config = apply_hosting_overrides(
        builder,
        std::env::var("PORT").ok(),
        std::env::var("DEBUG").ok(),
    )?
    .build()?;

    let config: Config = config.try_deserialize::<Config>()?;
    if let Err(e) = config.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }

    Ok(config)
}

/// Plain `PORT` / `DEBUG` variables set by hosting platforms take precedence
/// over every other source.
fn apply_hosting_overrides(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    port: Option<String>,
    debug: Option<String>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
    let debug = debug.map(|value| value.eq_ignore_ascii_case("true"));
    builder
        .set_override_option("server.port", port)?
        .set_override_option("server.debug", debug)
}
