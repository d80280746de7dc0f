//! Detection quality against ground-truth labels carried by synthetic batches.

use crate::types::detection::{AnomalyType, DetectionResult};
use crate::types::transaction::Transaction;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// Labelled anomaly vs. detected anomaly counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub true_positives: u64,
    pub false_positives: u64,
    pub true_negatives: u64,
    pub false_negatives: u64,
}

impl ConfusionMatrix {
    pub fn record(&mut self, labelled: bool, detected: bool) {
        match (labelled, detected) {
            (true, true) => self.true_positives += 1,
            (false, true) => self.false_positives += 1,
            (false, false) => self.true_negatives += 1,
            (true, false) => self.false_negatives += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    /// 0 when nothing was detected
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    /// 0 when nothing was labelled anomalous
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r > 0.0 {
            2.0 * p * r / (p + r)
        } else {
            0.0
        }
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub matrix: ConfusionMatrix,
    /// Detected anomalies per classified type
    pub detected_by_type: BTreeMap<AnomalyType, u64>,
}

impl Evaluation {
    /// Compare results with the labels of the transactions they came from.
    ///
    /// Returns `None` when no transaction carries a label. Unlabelled
    /// transactions are left out of the matrix but still counted by type.
    pub fn from_batch(transactions: &[Transaction], results: &[DetectionResult]) -> Option<Self> {
        let labels: HashMap<&str, bool> = transactions
            .iter()
            .filter_map(|tx| tx.is_anomaly.map(|label| (tx.transaction_id.as_str(), label)))
            .collect();
        if labels.is_empty() {
            return None;
        }

        let mut matrix = ConfusionMatrix::default();
        let mut detected_by_type = BTreeMap::new();
        for result in results {
            if let Some(&labelled) = labels.get(result.transaction_id.as_str()) {
                matrix.record(labelled, result.is_detected_anomaly);
            }
            if result.is_detected_anomaly {
                *detected_by_type.entry(result.detected_anomaly_type).or_insert(0) += 1;
            }
        }

        Some(Self {
            matrix,
            detected_by_type,
        })
    }

    pub fn log(&self) {
        let m = &self.matrix;
        info!(
            labelled = m.total(),
            true_positives = m.true_positives,
            false_positives = m.false_positives,
            true_negatives = m.true_negatives,
            false_negatives = m.false_negatives,
            precision = m.precision(),
            recall = m.recall(),
            f1 = m.f1(),
            "Detection quality against labels"
        );
        for (anomaly_type, count) in &self.detected_by_type {
            info!(anomaly_type = %anomaly_type, count = *count, "Detected anomalies by type");
        }
    }
}
