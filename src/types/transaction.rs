//! Transaction data structures

use crate::error::InputError;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A financial transaction to be scored. Read-only input to the detectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TransactionRecord")]
pub struct Transaction {
    /// Unique transaction identifier (unique within a batch)
    pub transaction_id: String,

    /// Owning user
    pub user_id: String,

    /// Monetary value
    pub value: f64,

    /// Naive timestamp, compared as-is
    pub timestamp: NaiveDateTime,

    /// Payment type (PIX, TED, Boleto, ...)
    #[serde(rename = "type")]
    pub tx_type: String,

    /// Spending category
    pub category: String,

    pub merchant: String,

    pub city: String,

    /// State or region code
    pub state: String,

    /// Device class (Mobile, Desktop, Tablet)
    pub device: String,

    /// Ground-truth label, present only on synthetic batches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_anomaly: Option<bool>,

    /// Ground-truth anomaly pattern, present only on synthetic batches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_type: Option<String>,
}

/// Wire form of a transaction, before the timestamp has been parsed.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: String,
    pub user_id: String,
    pub value: f64,
    pub timestamp: String,
    #[serde(rename = "type", alias = "transaction_type", default)]
    pub tx_type: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub merchant: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub is_anomaly: Option<bool>,
    #[serde(default)]
    pub anomaly_type: Option<String>,
}

impl TryFrom<TransactionRecord> for Transaction {
    type Error = InputError;

    fn try_from(record: TransactionRecord) -> Result<Self, Self::Error> {
        let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| {
            InputError::MalformedTimestamp {
                transaction_id: record.transaction_id.clone(),
                value: record.timestamp.clone(),
            }
        })?;

        Ok(Self {
            transaction_id: record.transaction_id,
            user_id: record.user_id,
            value: record.value,
            timestamp,
            tx_type: record.tx_type,
            category: record.category,
            merchant: record.merchant,
            city: record.city,
            state: record.state,
            device: record.device,
            is_anomaly: record.is_anomaly,
            anomaly_type: record.anomaly_type,
        })
    }
}

/// Parse an RFC 3339 timestamp (converted to UTC) or a naive
/// `YYYY-MM-DD[T ]HH:MM:SS[.fff]` timestamp.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

impl Transaction {
    /// Create a transaction with required fields; descriptive fields get neutral defaults
    pub fn new(
        transaction_id: impl Into<String>,
        user_id: impl Into<String>,
        value: f64,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            user_id: user_id.into(),
            value,
            timestamp,
            tx_type: "PIX".to_string(),
            category: "Alimentação".to_string(),
            merchant: String::new(),
            city: String::new(),
            state: String::new(),
            device: "Mobile".to_string(),
            is_anomaly: None,
            anomaly_type: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_type(mut self, tx_type: impl Into<String>) -> Self {
        self.tx_type = tx_type.into();
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Decode a JSON array of transactions.
    ///
    /// Timestamp problems are reported per transaction rather than as a
    /// generic payload error.
    pub fn parse_batch(payload: &[u8]) -> Result<Vec<Transaction>, InputError> {
        let records: Vec<TransactionRecord> = serde_json::from_slice(payload)
            .map_err(|e| InputError::MalformedPayload(e.to_string()))?;

        records.into_iter().map(Transaction::try_from).collect()
    }
}
