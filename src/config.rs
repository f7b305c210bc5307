//! Configuration management for the grade prediction service

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Default configuration file location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub batch: BatchConfig,
    pub nats: NatsConfig,
    pub pipeline: PipelineConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Listen port (overridden by the `PORT` environment variable)
    pub port: u16,
    /// Directory served under `/static`
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

fn default_static_dir() -> String {
    "static".to_string()
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// ONNX classifier file
    pub model_path: String,
    /// Fitted standard scaler, exported as JSON
    pub scaler_path: String,
    /// Optional sidecar listing the model's training feature names
    #[serde(default)]
    pub feature_info_path: Option<String>,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_onnx_threads() -> usize {
    1
}

/// Batch limits enforced before the orchestrator runs
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_max_batch_size")]
    pub max_size: usize,
}

fn default_max_batch_size() -> usize {
    100
}

/// NATS request/reply configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// Whether to start the NATS responder alongside the HTTP server
    #[serde(default)]
    pub enabled: bool,
    /// NATS server URL
    pub url: String,
    /// Subject on which prediction requests arrive
    pub request_subject: String,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of NATS requests processed concurrently
    pub workers: usize,
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between logged summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from `GRADES_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("GRADES_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path.
    ///
    /// `GRADES__<SECTION>__<KEY>` environment variables override file values,
    /// and `PORT` overrides `server.port`.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("GRADES").separator("__"))
            .set_override_option("server.port", std::env::var("PORT").ok())
            .context("Failed to apply PORT override")?
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                static_dir: default_static_dir(),
            },
            models: ModelsConfig {
                model_path: "models/grade_classifier.onnx".to_string(),
                scaler_path: "models/scaler.json".to_string(),
                feature_info_path: Some("models/feature_info.json".to_string()),
                onnx_threads: 1,
            },
            batch: BatchConfig {
                max_size: default_max_batch_size(),
            },
            nats: NatsConfig {
                enabled: false,
                url: "nats://localhost:4222".to_string(),
                request_subject: "grades.predict".to_string(),
            },
            pipeline: PipelineConfig { workers: 4 },
            metrics: MetricsConfig {
                report_interval_secs: 60,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.batch.max_size, 100);
        assert_eq!(config.nats.request_subject, "grades.predict");
        assert!(!config.nats.enabled);
    }

    #[test]
    fn test_shipped_config_file() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/config.toml");
        let config = AppConfig::load_from_path(path).unwrap();
        assert_eq!(config.models.scaler_path, "models/scaler.json");
        assert_eq!(config.batch.max_size, 100);
        assert_eq!(config.models.onnx_threads, 1);
    }
}
