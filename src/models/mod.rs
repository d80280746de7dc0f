//! Anomaly detectors and vote fusion

pub mod aggregator;
pub mod isolation_forest;
pub mod lof;
pub mod rules;
pub mod statistical;
pub mod stats;

pub use aggregator::{AnomalyClassifier, Evidence, Verdicts, DETECTION_VOTES};
pub use isolation_forest::IsolationForest;
pub use lof::LocalOutlierFactor;
pub use rules::{RuleEngine, RuleOutcome};
pub use statistical::ZScoreDetector;
