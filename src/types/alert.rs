//! Anomaly alert data structures

use crate::types::detection::{AnomalyType, DetectionResult};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

const ALERT_ID_PREFIX_LEN: usize = 8;

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Medium,
    High,
}

impl Severity {
    /// HIGH when three or more detectors agree
    pub fn from_anomaly_score(anomaly_score: u8) -> Self {
        if anomaly_score >= 3 {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
        }
    }
}

/// Detector verdicts and raw scores kept on the alert for auditing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDetails {
    pub isolation_forest: bool,
    pub z_score: bool,
    pub lof: bool,
    pub business_rules: bool,
    pub if_score: f64,
    pub lof_score: f64,
    pub value_z_score: f64,
}

/// Alert raised for a transaction flagged by the ensemble.
///
/// Fields are only readable once the alert exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    alert_id: String,
    timestamp: NaiveDateTime,
    severity: Severity,
    transaction_id: String,
    user_id: String,
    value: f64,
    anomaly_type: AnomalyType,
    anomaly_score: u8,
    details: AlertDetails,
}

impl Alert {
    /// Build an alert from a detection result and the transaction timestamp.
    ///
    /// The id keeps only the first 8 characters of the transaction id, so two
    /// transactions sharing that prefix produce the same alert id.
    pub fn from_detection(result: &DetectionResult, timestamp: NaiveDateTime) -> Self {
        let prefix: String = result
            .transaction_id
            .chars()
            .take(ALERT_ID_PREFIX_LEN)
            .collect();

        Self {
            alert_id: format!("ALERT_{}", prefix),
            timestamp,
            severity: Severity::from_anomaly_score(result.anomaly_score),
            transaction_id: result.transaction_id.clone(),
            user_id: result.user_id.clone(),
            value: result.value,
            anomaly_type: result.detected_anomaly_type,
            anomaly_score: result.anomaly_score,
            details: AlertDetails {
                isolation_forest: result.density_anomaly,
                z_score: result.statistical_anomaly,
                lof: result.local_density_anomaly,
                business_rules: result.rule_anomaly,
                if_score: result.density_score,
                lof_score: result.local_density_score,
                value_z_score: result.value_z_score,
            },
        }
    }

    pub fn alert_id(&self) -> &str {
        &self.alert_id
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn anomaly_type(&self) -> AnomalyType {
        self.anomaly_type
    }

    pub fn anomaly_score(&self) -> u8 {
        self.anomaly_score
    }

    pub fn details(&self) -> &AlertDetails {
        &self.details
    }
}
