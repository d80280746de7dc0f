//! Per-transaction detection output

use serde::{Deserialize, Serialize};
use std::fmt;

/// Most likely kind of anomaly for a flagged transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Normal,
    HighValue,
    UnusualTime,
    RapidSequence,
    MultipleRules,
    StatisticalOutlier,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::Normal => "normal",
            AnomalyType::HighValue => "high_value",
            AnomalyType::UnusualTime => "unusual_time",
            AnomalyType::RapidSequence => "rapid_sequence",
            AnomalyType::MultipleRules => "multiple_rules",
            AnomalyType::StatisticalOutlier => "statistical_outlier",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdicts of the four detectors plus the fused decision for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub transaction_id: String,
    pub user_id: String,
    pub value: f64,

    /// Isolation forest verdict
    pub density_anomaly: bool,
    /// Isolation forest score, lower = more anomalous
    pub density_score: f64,

    /// Z-score verdict (global or per user)
    pub statistical_anomaly: bool,
    pub value_z_score: f64,
    pub value_z_score_user: f64,

    /// Local outlier factor verdict
    pub local_density_anomaly: bool,
    /// Negative outlier factor, lower = more anomalous
    pub local_density_score: f64,

    /// Business rules verdict (any of R1-R4)
    pub rule_anomaly: bool,
    pub rules_triggered_count: u8,
    pub rule_high_value: bool,
    pub rule_suspicious_hour: bool,
    pub rule_hourly_velocity: bool,
    pub rule_rapid_interval: bool,
    pub transactions_last_hour: usize,

    /// Number of detectors that fired, 0-4
    pub anomaly_score: u8,
    /// `anomaly_score >= 2`
    pub is_detected_anomaly: bool,
    pub detected_anomaly_type: AnomalyType,
}

/// What happened to the models during one detection pass.
///
/// Lets callers tell "nothing anomalous" apart from "detector disabled
/// because the batch was too small".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionDiagnostics {
    pub batch_size: usize,
    pub density_degraded: bool,
    pub local_density_degraded: bool,
    /// Neighbour count actually used by the local outlier factor
    pub effective_neighbors: usize,
    /// Detected transactions; each one gets exactly one alert
    pub anomalies_detected: usize,
}

impl DetectionDiagnostics {
    pub fn any_degraded(&self) -> bool {
        self.density_degraded || self.local_density_degraded
    }
}
