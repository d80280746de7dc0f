//! Error types for the detection pipeline.
//!
//! Input and configuration problems reject the whole call. A batch that is
//! too small for a model is not an error: the detector degrades and the
//! engine reports it through `DetectionDiagnostics`.

use thiserror::Error;

/// The transaction batch cannot be processed as given.
#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("transaction batch is empty")]
    EmptyBatch,

    #[error("duplicate transaction id in batch: {0}")]
    DuplicateTransactionId(String),

    #[error("malformed timestamp {value:?} for transaction {transaction_id}")]
    MalformedTimestamp {
        transaction_id: String,
        value: String,
    },

    #[error("invalid value {value} for transaction {transaction_id}: must be finite and non-negative")]
    InvalidValue { transaction_id: String, value: f64 },

    #[error("malformed batch payload: {0}")]
    MalformedPayload(String),

    #[error("batch of {size} transactions exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },
}

/// The detection configuration is unusable.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("contamination must be within (0, 1), got {0}")]
    Contamination(f64),

    #[error("{name} must be finite and non-negative, got {value}")]
    NegativeThreshold { name: &'static str, value: f64 },

    #[error("suspicious hours ({start}, {end}) must satisfy start <= end <= 23")]
    SuspiciousHours { start: u32, end: u32 },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Failure of a single `detect` call.
#[derive(Debug, Error, PartialEq)]
pub enum DetectError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
