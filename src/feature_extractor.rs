//! Feature extraction over a batch of transactions.
//!
//! Every feature here is relative to the batch: user aggregates, inter-arrival
//! times and categorical codes are recomputed per call and must not be
//! persisted beyond one detection pass.

use crate::models::stats::mean_and_sample_std;
use crate::types::features::{FeatureRow, RowId, DENSITY_FEATURES};
use crate::types::transaction::Transaction;
use chrono::{Datelike, Timelike};
use std::collections::{BTreeSet, HashMap};

/// Inter-arrival time assigned to a user's first transaction in the batch
pub const DEFAULT_TIME_SINCE_LAST: f64 = 3600.0;

/// Hours treated as night-time by the `is_night` feature
const NIGHT_HOURS: std::ops::RangeInclusive<u32> = 0..=5;

/// Builds one `FeatureRow` per transaction, in input order.
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Derive time, per-user and velocity features for a batch.
    pub fn extract(&self, transactions: &[Transaction]) -> Vec<FeatureRow> {
        let n = transactions.len();

        let mut rows_by_user: HashMap<&str, Vec<RowId>> = HashMap::new();
        for (row_id, tx) in transactions.iter().enumerate() {
            rows_by_user.entry(tx.user_id.as_str()).or_default().push(row_id);
        }

        let mut user_count = vec![0usize; n];
        let mut user_avg = vec![0.0; n];
        let mut user_std = vec![0.0; n];
        let mut time_since_last = vec![DEFAULT_TIME_SINCE_LAST; n];

        for rows in rows_by_user.values_mut() {
            let values: Vec<f64> = rows.iter().map(|&r| transactions[r].value).collect();
            let (mean, std) = mean_and_sample_std(&values);

            // Row id breaks timestamp ties so the ordering never depends on hashing
            rows.sort_by_key(|&r| (transactions[r].timestamp, r));
            for pair in rows.windows(2) {
                let elapsed = transactions[pair[1]].timestamp - transactions[pair[0]].timestamp;
                time_since_last[pair[1]] = elapsed.num_milliseconds() as f64 / 1000.0;
            }

            for &r in rows.iter() {
                user_count[r] = rows.len();
                user_avg[r] = mean;
                user_std[r] = std;
            }
        }

        let types = CategoryEncoder::fit(transactions.iter().map(|t| t.tx_type.as_str()));
        let categories = CategoryEncoder::fit(transactions.iter().map(|t| t.category.as_str()));
        let devices = CategoryEncoder::fit(transactions.iter().map(|t| t.device.as_str()));

        transactions
            .iter()
            .enumerate()
            .map(|(row_id, tx)| {
                let hour = tx.timestamp.hour();
                let day_of_week = tx.timestamp.weekday().num_days_from_monday();

                FeatureRow {
                    row_id,
                    transaction_id: tx.transaction_id.clone(),
                    user_id: tx.user_id.clone(),
                    value: tx.value,
                    timestamp: tx.timestamp,
                    hour,
                    day_of_week,
                    is_weekend: day_of_week >= 5,
                    is_night: NIGHT_HOURS.contains(&hour),
                    user_transaction_count: user_count[row_id],
                    user_avg_value: user_avg[row_id],
                    user_std_value: user_std[row_id],
                    deviation_from_avg: (tx.value - user_avg[row_id]) / (user_std[row_id] + 1.0),
                    time_since_last: time_since_last[row_id],
                    type_encoded: types.encode(&tx.tx_type),
                    category_encoded: categories.encode(&tx.category),
                    device_encoded: devices.encode(&tx.device),
                }
            })
            .collect()
    }

    /// Number of features fed to the isolation forest.
    pub fn feature_count(&self) -> usize {
        DENSITY_FEATURES.len()
    }

    pub fn feature_names(&self) -> Vec<&'static str> {
        DENSITY_FEATURES.to_vec()
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes a categorical column as the rank of each value among the batch's
/// sorted distinct values, so codes do not depend on arrival order.
struct CategoryEncoder<'a> {
    codes: HashMap<&'a str, u32>,
}

impl<'a> CategoryEncoder<'a> {
    fn fit(values: impl Iterator<Item = &'a str>) -> Self {
        let distinct: BTreeSet<&str> = values.collect();
        let codes = distinct
            .into_iter()
            .enumerate()
            .map(|(code, value)| (value, code as u32))
            .collect();
        Self { codes }
    }

    fn encode(&self, value: &str) -> u32 {
        self.codes.get(value).copied().unwrap_or(0)
    }
}
