//! Transaction Anomaly Detector Library
//!
//! Scores batches of financial transactions with an ensemble of four
//! detectors (isolation forest, Z-score, local outlier factor, business
//! rules), fuses their votes and raises alerts for the transactions at least
//! two of them agree on.

pub mod config;
pub mod consumer;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod types;

pub use config::{AppConfig, DetectionConfig};
pub use consumer::BatchConsumer;
pub use engine::{detect, DetectionEngine, DetectionOutcome};
pub use error::{ConfigError, DetectError, InputError};
pub use feature_extractor::FeatureExtractor;
pub use producer::AlertProducer;
pub use types::{
    alert::{Alert, Severity},
    detection::{AnomalyType, DetectionDiagnostics, DetectionResult},
    transaction::Transaction,
};
