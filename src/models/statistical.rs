//! Z-score deviation detector, global and per user.

use crate::models::stats::mean_and_sample_std;
use crate::types::features::FeatureRow;

/// Added to the per-user deviation so single-transaction users never divide by zero
const USER_STD_STABILIZER: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct StatisticalOutput {
    pub flags: Vec<bool>,
    /// `|value - batch_mean| / batch_std`, 0 when the batch has no spread
    pub global_z: Vec<f64>,
    /// `|value - user_mean| / (user_std + 0.01)`
    pub user_z: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ZScoreDetector {
    threshold: f64,
}

impl ZScoreDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn detect(&self, rows: &[FeatureRow]) -> StatisticalOutput {
        let values: Vec<f64> = rows.iter().map(|r| r.value).collect();
        let (mean, std) = mean_and_sample_std(&values);

        let global_z: Vec<f64> = values
            .iter()
            .map(|v| if std > 0.0 { (v - mean).abs() / std } else { 0.0 })
            .collect();

        let user_z: Vec<f64> = rows
            .iter()
            .map(|r| (r.value - r.user_avg_value).abs() / (r.user_std_value + USER_STD_STABILIZER))
            .collect();

        let flags = global_z
            .iter()
            .zip(&user_z)
            .map(|(&g, &u)| g > self.threshold || u > self.threshold)
            .collect();

        StatisticalOutput {
            flags,
            global_z,
            user_z,
        }
    }
}
