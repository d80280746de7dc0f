//! Business rule thresholds.
//!
//! R1 value cap, R2 suspicious hour, R3 per-user trailing-hour velocity,
//! R4 minimum gap between consecutive transactions.

use crate::config::DetectionConfig;
use crate::types::features::{FeatureRow, RowId};
use chrono::Duration;
use std::collections::HashMap;

/// Rule verdicts for one transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleOutcome {
    /// R1
    pub high_value: bool,
    /// R2
    pub suspicious_hour: bool,
    /// R3
    pub hourly_velocity: bool,
    /// R4
    pub rapid_interval: bool,
    /// User's transactions in `(t - 1h, t]`, including this one
    pub transactions_last_hour: usize,
}

impl RuleOutcome {
    pub fn triggered_count(&self) -> u8 {
        [
            self.high_value,
            self.suspicious_hour,
            self.hourly_velocity,
            self.rapid_interval,
        ]
        .iter()
        .filter(|&&r| r)
        .count() as u8
    }

    pub fn any(&self) -> bool {
        self.triggered_count() > 0
    }
}

#[derive(Debug, Clone)]
pub struct RuleEngine {
    max_value_single: f64,
    suspicious_hours: (u32, u32),
    max_tx_per_hour: usize,
    rapid_interval_seconds: f64,
}

impl RuleEngine {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            max_value_single: config.max_value_single,
            suspicious_hours: config.suspicious_hours,
            max_tx_per_hour: config.max_tx_per_hour,
            rapid_interval_seconds: config.rapid_interval_seconds,
        }
    }

    /// Evaluate every rule; `result[i]` belongs to `rows[i]` whatever order the
    /// rows arrive in.
    pub fn evaluate(&self, rows: &[FeatureRow]) -> Vec<RuleOutcome> {
        let window_counts = trailing_hour_counts(rows);
        let (start, end) = self.suspicious_hours;

        rows.iter()
            .map(|row| {
                let transactions_last_hour = window_counts.get(&row.row_id).copied().unwrap_or(1);
                RuleOutcome {
                    high_value: row.value > self.max_value_single,
                    suspicious_hour: (start..=end).contains(&row.hour),
                    hourly_velocity: transactions_last_hour > self.max_tx_per_hour,
                    rapid_interval: row.time_since_last < self.rapid_interval_seconds,
                    transactions_last_hour,
                }
            })
            .collect()
    }
}

/// Per-user count of transactions in the trailing hour, keyed by row id.
///
/// Works on a user-grouped, time-sorted view of the rows; the caller joins
/// the counts back by row id.
fn trailing_hour_counts(rows: &[FeatureRow]) -> HashMap<RowId, usize> {
    let window = Duration::hours(1);

    let mut by_user: HashMap<&str, Vec<&FeatureRow>> = HashMap::new();
    for row in rows {
        by_user.entry(row.user_id.as_str()).or_default().push(row);
    }

    let mut counts = HashMap::with_capacity(rows.len());
    for user_rows in by_user.values_mut() {
        user_rows.sort_by_key(|r| (r.timestamp, r.row_id));

        let mut start = 0;
        for (i, row) in user_rows.iter().enumerate() {
            while user_rows[start].timestamp <= row.timestamp - window {
                start += 1;
            }
            counts.insert(row.row_id, i - start + 1);
        }
    }
    counts
}
