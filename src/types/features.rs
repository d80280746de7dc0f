//! Derived per-transaction features

use chrono::NaiveDateTime;
use serde::Serialize;

/// Position of a transaction in the batch handed to the engine.
///
/// Every stage keys its output by this id so that per-user or time-sorted
/// working views can be joined back without positional tricks.
pub type RowId = usize;

/// One transaction augmented with time, user-aggregate and velocity features.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub row_id: RowId,
    pub transaction_id: String,
    pub user_id: String,
    pub value: f64,
    pub timestamp: NaiveDateTime,

    /// Hour of day, 0-23
    pub hour: u32,
    /// Day of week, Monday = 0
    pub day_of_week: u32,
    pub is_weekend: bool,
    /// Hour within [0, 5]
    pub is_night: bool,

    pub user_transaction_count: usize,
    pub user_avg_value: f64,
    /// Sample standard deviation, 0 for a single transaction
    pub user_std_value: f64,
    /// `(value - user_avg) / (user_std + 1)`
    pub deviation_from_avg: f64,
    /// Seconds since the user's previous transaction, 3600 for the first
    pub time_since_last: f64,

    pub type_encoded: u32,
    pub category_encoded: u32,
    pub device_encoded: u32,
}

impl FeatureRow {
    /// Input vector for the isolation forest, in `DENSITY_FEATURES` order.
    pub fn density_vector(&self) -> Vec<f64> {
        vec![
            self.value,
            self.hour as f64,
            self.day_of_week as f64,
            self.user_transaction_count as f64,
            self.deviation_from_avg,
            self.time_since_last,
            self.type_encoded as f64,
            self.category_encoded as f64,
            self.device_encoded as f64,
        ]
    }

    /// Reduced input vector for the local outlier factor, in `LOCAL_DENSITY_FEATURES` order.
    pub fn local_density_vector(&self) -> Vec<f64> {
        vec![
            self.value,
            self.hour as f64,
            self.deviation_from_avg,
            self.time_since_last,
        ]
    }
}

pub const DENSITY_FEATURES: [&str; 9] = [
    "value",
    "hour",
    "day_of_week",
    "user_transaction_count",
    "deviation_from_avg",
    "time_since_last",
    "type_encoded",
    "category_encoded",
    "device_encoded",
];

pub const LOCAL_DENSITY_FEATURES: [&str; 4] =
    ["value", "hour", "deviation_from_avg", "time_since_last"];
