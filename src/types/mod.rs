//! Type definitions for the anomaly detection pipeline

pub mod alert;
pub mod detection;
pub mod features;
pub mod transaction;

pub use alert::{Alert, AlertDetails, Severity};
pub use detection::{AnomalyType, DetectionDiagnostics, DetectionResult};
pub use features::{FeatureRow, RowId};
pub use transaction::Transaction;
