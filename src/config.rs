//! Configuration management for the anomaly detection service

use crate::error::ConfigError;
use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject carrying transaction batches (JSON arrays)
    pub transaction_subject: String,
    /// Subject for outgoing alerts
    pub alert_subject: String,
    /// Subject for per-batch detection results
    pub result_subject: String,
}

/// Detection options passed explicitly to every detection call
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DetectionConfig {
    /// Expected share of anomalies, within (0, 1)
    #[serde(default = "default_contamination")]
    pub contamination: f64,
    /// Z-score above which a value is a statistical outlier
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,
    /// Largest value a single transaction may carry
    #[serde(default = "default_max_value_single")]
    pub max_value_single: f64,
    /// Inclusive hour window treated as suspicious
    #[serde(default = "default_suspicious_hours")]
    pub suspicious_hours: (u32, u32),
    /// Transactions per user allowed within a trailing hour
    #[serde(default = "default_max_tx_per_hour")]
    pub max_tx_per_hour: usize,
    /// Consecutive transactions closer than this are rapid
    #[serde(default = "default_rapid_interval_seconds")]
    pub rapid_interval_seconds: f64,
    /// Trees in the isolation forest
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    /// Neighbours for the local outlier factor (clamped to batch size - 1)
    #[serde(default = "default_n_neighbors")]
    pub n_neighbors: usize,
    /// Below this batch size the isolation forest is disabled
    #[serde(default = "default_min_density_samples")]
    pub min_density_samples: usize,
    /// Seed for the isolation forest
    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
}

fn default_contamination() -> f64 {
    0.05
}

fn default_z_threshold() -> f64 {
    3.0
}

fn default_max_value_single() -> f64 {
    10_000.0
}

fn default_suspicious_hours() -> (u32, u32) {
    (0, 5)
}

fn default_max_tx_per_hour() -> usize {
    10
}

fn default_rapid_interval_seconds() -> f64 {
    30.0
}

fn default_n_estimators() -> usize {
    100
}

fn default_n_neighbors() -> usize {
    20
}

fn default_min_density_samples() -> usize {
    10
}

fn default_random_seed() -> u64 {
    42
}

impl DetectionConfig {
    /// Reject unusable settings before any batch is processed
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.contamination > 0.0 && self.contamination < 1.0) {
            return Err(ConfigError::Contamination(self.contamination));
        }

        for (name, value) in [
            ("z_threshold", self.z_threshold),
            ("max_value_single", self.max_value_single),
            ("rapid_interval_seconds", self.rapid_interval_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::NegativeThreshold { name, value });
            }
        }

        let (start, end) = self.suspicious_hours;
        if start > end || end > 23 {
            return Err(ConfigError::SuspiciousHours { start, end });
        }

        if self.n_estimators == 0 {
            return Err(ConfigError::Zero("n_estimators"));
        }
        if self.n_neighbors == 0 {
            return Err(ConfigError::Zero("n_neighbors"));
        }

        Ok(())
    }

    pub fn with_contamination(mut self, contamination: f64) -> Self {
        self.contamination = contamination;
        self
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            contamination: default_contamination(),
            z_threshold: default_z_threshold(),
            max_value_single: default_max_value_single(),
            suspicious_hours: default_suspicious_hours(),
            max_tx_per_hour: default_max_tx_per_hour(),
            rapid_interval_seconds: default_rapid_interval_seconds(),
            n_estimators: default_n_estimators(),
            n_neighbors: default_n_neighbors(),
            min_density_samples: default_min_density_samples(),
            random_seed: default_random_seed(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Batches larger than this are rejected
    pub max_batch_size: usize,
    /// Seconds between metrics summaries
    pub metrics_interval_secs: u64,
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
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config
            .detection
            .validate()
            .context("Invalid detection configuration")?;

        Ok(app_config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                transaction_subject: "transactions.batch".to_string(),
                alert_subject: "anomaly.alerts".to_string(),
                result_subject: "anomaly.results".to_string(),
            },
            detection: DetectionConfig::default(),
            pipeline: PipelineConfig {
                max_batch_size: 50_000,
                metrics_interval_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
