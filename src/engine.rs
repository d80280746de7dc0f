//! Detection engine: one stateless pass over a transaction batch.
//!
//! Features are derived once, the four detectors run independently over the
//! same rows, and fusion joins their outputs by row id. Models are built for
//! the call and dropped with it, so nothing learned from one batch leaks into
//! the next.

use crate::config::DetectionConfig;
use crate::error::{ConfigError, DetectError, InputError};
use crate::feature_extractor::FeatureExtractor;
use crate::models::aggregator::{AnomalyClassifier, Evidence, Verdicts};
use crate::models::isolation_forest::IsolationForest;
use crate::models::lof::LocalOutlierFactor;
use crate::models::rules::RuleEngine;
use crate::models::statistical::ZScoreDetector;
use crate::types::alert::Alert;
use crate::types::detection::{DetectionDiagnostics, DetectionResult};
use crate::types::transaction::Transaction;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Everything one detection pass produces
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    results: Vec<DetectionResult>,
    alerts: Vec<Alert>,
    diagnostics: DetectionDiagnostics,
}

impl DetectionOutcome {
    /// One result per input transaction, in input order
    pub fn results(&self) -> &[DetectionResult] {
        &self.results
    }

    /// One alert per detected anomaly
    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn diagnostics(&self) -> &DetectionDiagnostics {
        &self.diagnostics
    }

    pub fn into_parts(self) -> (Vec<DetectionResult>, Vec<Alert>) {
        (self.results, self.alerts)
    }
}

/// Validated detection settings. Holds no model state between calls.
#[derive(Debug, Clone)]
pub struct DetectionEngine {
    config: DetectionConfig,
}

impl DetectionEngine {
    pub fn new(config: DetectionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Score a batch. Input problems reject the whole batch.
    pub fn detect(&self, transactions: &[Transaction]) -> Result<DetectionOutcome, InputError> {
        validate_batch(transactions)?;
        let config = &self.config;

        info!(batch_size = transactions.len(), "Starting detection pass");

        let rows = FeatureExtractor::new().extract(transactions);
        debug!(rows = rows.len(), "Features extracted");

        let density = IsolationForest::new(
            config.n_estimators,
            config.contamination,
            config.min_density_samples,
            config.random_seed,
        )
        .detect(&rows);
        let statistical = ZScoreDetector::new(config.z_threshold).detect(&rows);
        let local_density =
            LocalOutlierFactor::new(config.n_neighbors, config.contamination).detect(&rows);
        let rules = RuleEngine::new(config).evaluate(&rows);

        if density.degraded {
            warn!(
                batch_size = rows.len(),
                min_samples = config.min_density_samples,
                "Isolation forest disabled for small batch"
            );
        }
        if local_density.degraded {
            warn!(batch_size = rows.len(), "Local outlier factor disabled for small batch");
        }

        let classifier = AnomalyClassifier::new(config.z_threshold);

        // Every detector output is aligned with `rows`, and rows carry their
        // position in `transactions` as row id.
        let mut results = Vec::with_capacity(rows.len());
        let mut alerts = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let rule = rules[i];
            let verdicts = Verdicts {
                density: density.flags[i],
                statistical: statistical.flags[i],
                local_density: local_density.flags[i],
                rule_based: rule.any(),
            };
            let evidence = Evidence {
                value_z_score: statistical.global_z[i],
                is_night: row.is_night,
                time_since_last: row.time_since_last,
                rules_triggered_count: rule.triggered_count(),
            };

            let result = DetectionResult {
                transaction_id: row.transaction_id.clone(),
                user_id: row.user_id.clone(),
                value: row.value,
                density_anomaly: verdicts.density,
                density_score: density.scores[i],
                statistical_anomaly: verdicts.statistical,
                value_z_score: statistical.global_z[i],
                value_z_score_user: statistical.user_z[i],
                local_density_anomaly: verdicts.local_density,
                local_density_score: local_density.scores[i],
                rule_anomaly: verdicts.rule_based,
                rules_triggered_count: rule.triggered_count(),
                rule_high_value: rule.high_value,
                rule_suspicious_hour: rule.suspicious_hour,
                rule_hourly_velocity: rule.hourly_velocity,
                rule_rapid_interval: rule.rapid_interval,
                transactions_last_hour: rule.transactions_last_hour,
                anomaly_score: verdicts.anomaly_score(),
                is_detected_anomaly: verdicts.is_detected(),
                detected_anomaly_type: classifier.classify(&verdicts, &evidence),
            };

            if result.is_detected_anomaly {
                alerts.push(Alert::from_detection(&result, transactions[row.row_id].timestamp));
            }
            results.push(result);
        }

        let diagnostics = DetectionDiagnostics {
            batch_size: transactions.len(),
            density_degraded: density.degraded,
            local_density_degraded: local_density.degraded,
            effective_neighbors: local_density.effective_neighbors,
            anomalies_detected: alerts.len(),
        };

        info!(
            batch_size = diagnostics.batch_size,
            anomalies = diagnostics.anomalies_detected,
            density_degraded = diagnostics.density_degraded,
            local_density_degraded = diagnostics.local_density_degraded,
            "Detection pass complete"
        );

        Ok(DetectionOutcome {
            results,
            alerts,
            diagnostics,
        })
    }
}

/// Validate the configuration, then score the batch.
pub fn detect(
    transactions: &[Transaction],
    config: &DetectionConfig,
) -> Result<DetectionOutcome, DetectError> {
    let engine = DetectionEngine::new(config.clone())?;
    Ok(engine.detect(transactions)?)
}

fn validate_batch(transactions: &[Transaction]) -> Result<(), InputError> {
    if transactions.is_empty() {
        return Err(InputError::EmptyBatch);
    }

    let mut seen = HashSet::with_capacity(transactions.len());
    for tx in transactions {
        if !seen.insert(tx.transaction_id.as_str()) {
            return Err(InputError::DuplicateTransactionId(tx.transaction_id.clone()));
        }
        if !tx.value.is_finite() || tx.value < 0.0 {
            return Err(InputError::InvalidValue {
                transaction_id: tx.transaction_id.clone(),
                value: tx.value,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::detection::AnomalyType;
    use crate::types::transaction::parse_timestamp;
    use chrono::{Duration, NaiveDateTime};
    use std::collections::HashMap;

    fn at(ts: &str) -> NaiveDateTime {
        parse_timestamp(ts).unwrap()
    }

    const CATEGORIES: [&str; 4] = ["Alimentação", "Transporte", "Saúde", "Lazer"];

    /// 60 ordinary daytime transactions spread over 12 users and a working day
    fn normal_batch() -> Vec<Transaction> {
        let start = at("2024-03-04T08:00:00");
        (0..60)
            .map(|i| {
                Transaction::new(
                    format!("norm-{:04}", i),
                    format!("USER_{}", 1000 + i % 12),
                    80.0 + ((i * 37) % 90) as f64,
                    start + Duration::minutes(i as i64 * 11),
                )
                .with_category(CATEGORIES[i % CATEGORIES.len()])
            })
            .collect()
    }

    #[test]
    fn test_scores_are_vote_counts() {
        let mut batch = normal_batch();
        batch.push(Transaction::new("odd-1", "USER_7777", 9000.0, at("2024-03-04T02:10:00")));
        let outcome = detect(&batch, &DetectionConfig::default()).unwrap();

        assert_eq!(outcome.results().len(), batch.len());
        for r in outcome.results() {
            let votes = [
                r.density_anomaly,
                r.statistical_anomaly,
                r.local_density_anomaly,
                r.rule_anomaly,
            ]
            .iter()
            .filter(|&&v| v)
            .count() as u8;
            assert_eq!(r.anomaly_score, votes);
            assert!(r.anomaly_score <= 4);
            assert_eq!(r.is_detected_anomaly, r.anomaly_score >= 2);
            assert_eq!(
                r.detected_anomaly_type == AnomalyType::Normal,
                !r.is_detected_anomaly
            );
        }

        let flagged = outcome.results().iter().filter(|r| r.is_detected_anomaly).count();
        assert_eq!(outcome.alerts().len(), flagged);
        assert_eq!(outcome.diagnostics().anomalies_detected, flagged);
    }

    #[test]
    fn test_results_follow_input_order() {
        let batch = normal_batch();
        let outcome = detect(&batch, &DetectionConfig::default()).unwrap();

        let ids: Vec<&str> = outcome.results().iter().map(|r| r.transaction_id.as_str()).collect();
        let expected: Vec<&str> = batch.iter().map(|t| t.transaction_id.as_str()).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_high_value_leisure_transaction() {
        let mut batch = normal_batch();
        batch.push(
            Transaction::new("hv-00001", "USER_5555", 15000.0, at("2024-03-04T14:30:00"))
                .with_category("Lazer"),
        );
        let outcome = detect(&batch, &DetectionConfig::default()).unwrap();
        let result = outcome.results().last().unwrap();

        assert!(result.rule_high_value);
        assert!(result.rule_anomaly);
        assert!(result.value_z_score > 3.0);
        assert!(result.statistical_anomaly);
        assert!(result.is_detected_anomaly);
        assert_eq!(result.detected_anomaly_type, AnomalyType::HighValue);

        let alert = outcome
            .alerts()
            .iter()
            .find(|a| a.transaction_id() == "hv-00001")
            .unwrap();
        assert_eq!(alert.alert_id(), "ALERT_hv-00001");
        assert_eq!(alert.anomaly_type(), AnomalyType::HighValue);
        assert_eq!(alert.timestamp(), at("2024-03-04T14:30:00"));
    }

    /// Eleven transactions from one user, `gap` apart. All carry 50 except the
    /// one at `spike`, which carries 190: ordinary for the batch, but more
    /// than three user standard deviations from the user's own mean.
    fn user_sequence(user: &str, start: NaiveDateTime, gap: Duration, spike: usize) -> Vec<Transaction> {
        (0..11)
            .map(|i| {
                let value = if i == spike { 190.0 } else { 50.0 };
                Transaction::new(
                    format!("{}-{:02}", user, i),
                    user,
                    value,
                    start + gap * i as i32,
                )
            })
            .collect()
    }

    fn result_for<'a>(outcome: &'a DetectionOutcome, transaction_id: &str) -> &'a DetectionResult {
        outcome
            .results()
            .iter()
            .find(|r| r.transaction_id == transaction_id)
            .unwrap()
    }

    #[test]
    fn test_rapid_burst_from_one_user() {
        let mut batch = normal_batch();
        batch.extend(user_sequence(
            "USER_RAPID",
            at("2024-03-04T13:00:00"),
            Duration::seconds(20),
            5,
        ));
        let outcome = detect(&batch, &DetectionConfig::default()).unwrap();

        let burst: Vec<&DetectionResult> = outcome
            .results()
            .iter()
            .filter(|r| r.user_id == "USER_RAPID")
            .collect();
        assert_eq!(burst.len(), 11);

        assert!(!burst[0].rule_rapid_interval);
        assert!(burst[1..].iter().all(|r| r.rule_rapid_interval));
        assert!(burst[..10].iter().all(|r| !r.rule_hourly_velocity));
        assert!(burst[10].rule_hourly_velocity);
        assert_eq!(burst[10].transactions_last_hour, 11);
        assert_eq!(burst[10].rules_triggered_count, 2);

        let spike = result_for(&outcome, "USER_RAPID-05");
        assert!(spike.value_z_score_user > 3.0);
        assert!(spike.value_z_score < 3.0);
        assert!(spike.statistical_anomaly);
        assert!(spike.rule_anomaly);
        assert!(spike.is_detected_anomaly);
        assert_eq!(spike.detected_anomaly_type, AnomalyType::RapidSequence);

        let alert = outcome
            .alerts()
            .iter()
            .find(|a| a.transaction_id() == "USER_RAPID-05")
            .unwrap();
        assert_eq!(alert.anomaly_type(), AnomalyType::RapidSequence);
    }

    #[test]
    fn test_night_spike_classified_as_unusual_time() {
        let mut batch = normal_batch();
        // Ten hourly daytime transactions, then one at 03:00 the same day
        let mut user = user_sequence("USER_NIGHT", at("2024-03-04T09:00:00"), Duration::hours(1), 10);
        user[10].timestamp = at("2024-03-04T03:00:00");
        batch.extend(user);
        let outcome = detect(&batch, &DetectionConfig::default()).unwrap();

        let night = result_for(&outcome, "USER_NIGHT-10");
        assert!(night.rule_suspicious_hour);
        assert_eq!(night.rules_triggered_count, 1);
        assert!(night.statistical_anomaly);
        assert!(night.value_z_score < 3.0);
        assert!(night.is_detected_anomaly);
        assert_eq!(night.detected_anomaly_type, AnomalyType::UnusualTime);

        let daytime = result_for(&outcome, "USER_NIGHT-03");
        assert!(!daytime.rule_anomaly);
        assert!(!daytime.statistical_anomaly);
    }

    #[test]
    fn test_two_rules_classified_as_multiple_rules() {
        let config = DetectionConfig {
            suspicious_hours: (13, 14),
            ..DetectionConfig::default()
        };
        let mut batch = normal_batch();
        // A minute apart: busy enough for the hourly limit, too slow to be rapid
        batch.extend(user_sequence(
            "USER_BUSY",
            at("2024-03-04T13:00:00"),
            Duration::minutes(1),
            10,
        ));
        let outcome = detect(&batch, &config).unwrap();

        let last = result_for(&outcome, "USER_BUSY-10");
        assert!(last.rule_suspicious_hour);
        assert!(last.rule_hourly_velocity);
        assert!(!last.rule_rapid_interval);
        assert_eq!(last.rules_triggered_count, 2);
        assert!(last.statistical_anomaly);
        assert!(last.value_z_score < 3.0);
        assert!(last.is_detected_anomaly);
        assert_eq!(last.detected_anomaly_type, AnomalyType::MultipleRules);
    }

    #[test]
    fn test_identical_values() {
        let start = at("2024-03-04T09:00:00");
        let batch: Vec<Transaction> = (0..25)
            .map(|i| {
                Transaction::new(
                    format!("same-{:02}", i),
                    format!("USER_{}", i % 5),
                    120.0,
                    start + Duration::minutes(i * 7),
                )
            })
            .collect();
        let outcome = detect(&batch, &DetectionConfig::default()).unwrap();

        for r in outcome.results() {
            assert_eq!(r.value_z_score, 0.0);
            assert_eq!(r.value_z_score_user, 0.0);
            assert!(!r.statistical_anomaly);
        }
    }

    #[test]
    fn test_single_transaction_batch() {
        let batch = vec![Transaction::new("only-1", "USER_1", 15000.0, at("2024-03-04T03:00:00"))];
        let outcome = detect(&batch, &DetectionConfig::default()).unwrap();

        let diagnostics = outcome.diagnostics();
        assert!(diagnostics.density_degraded);
        assert!(diagnostics.local_density_degraded);
        assert!(diagnostics.any_degraded());

        let result = &outcome.results()[0];
        assert!(!result.density_anomaly);
        assert!(!result.local_density_anomaly);
        assert_eq!(result.density_score, 0.0);
        assert_eq!(result.local_density_score, 0.0);
        assert!(!result.statistical_anomaly);
        assert!(result.rule_high_value);
        assert!(result.rule_suspicious_hour);
        assert_eq!(result.rules_triggered_count, 2);
        assert_eq!(result.anomaly_score, 1);
        assert!(!result.is_detected_anomaly);
        assert!(outcome.alerts().is_empty());
    }

    #[test]
    fn test_small_batch_degrades_only_density() {
        let batch: Vec<Transaction> = normal_batch().into_iter().take(5).collect();
        let outcome = detect(&batch, &DetectionConfig::default()).unwrap();

        assert!(outcome.diagnostics().density_degraded);
        assert!(!outcome.diagnostics().local_density_degraded);
        assert_eq!(outcome.diagnostics().effective_neighbors, 4);
    }

    #[test]
    fn test_deterministic_across_runs() {
        let mut batch = normal_batch();
        batch.push(Transaction::new("odd-1", "USER_7777", 9000.0, at("2024-03-04T02:10:00")));

        let first = detect(&batch, &DetectionConfig::default()).unwrap();
        let second = detect(&batch, &DetectionConfig::default()).unwrap();

        assert_eq!(first.results(), second.results());
        assert_eq!(first.alerts(), second.alerts());
    }

    #[test]
    fn test_rule_verdicts_independent_of_input_order() {
        let mut batch = normal_batch();
        let start = at("2024-03-04T13:00:00");
        for i in 0..12 {
            batch.push(Transaction::new(
                format!("burst-{:02}", i),
                "USER_RAPID",
                50.0,
                start + Duration::seconds(i * 17),
            ));
        }

        let verdicts = |batch: &[Transaction]| -> HashMap<String, (bool, bool, bool, bool, u8)> {
            detect(batch, &DetectionConfig::default())
                .unwrap()
                .results()
                .iter()
                .map(|r| {
                    (
                        r.transaction_id.clone(),
                        (
                            r.rule_high_value,
                            r.rule_suspicious_hour,
                            r.rule_hourly_velocity,
                            r.rule_rapid_interval,
                            r.rules_triggered_count,
                        ),
                    )
                })
                .collect()
        };

        let forward = verdicts(&batch);
        let mut reordered = batch.clone();
        reordered.reverse();
        reordered.rotate_left(7);
        assert_eq!(forward, verdicts(&reordered));
    }

    #[test]
    fn test_rejects_bad_input() {
        let config = DetectionConfig::default();
        assert_eq!(
            detect(&[], &config).unwrap_err(),
            DetectError::Input(InputError::EmptyBatch)
        );

        let mut batch = normal_batch();
        batch.push(batch[3].clone());
        assert_eq!(
            detect(&batch, &config).unwrap_err(),
            DetectError::Input(InputError::DuplicateTransactionId("norm-0003".to_string()))
        );

        let batch = vec![Transaction::new("nan", "u", f64::NAN, at("2024-03-04T10:00:00"))];
        assert!(matches!(
            detect(&batch, &config),
            Err(DetectError::Input(InputError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_rejects_bad_config_before_processing() {
        let config = DetectionConfig::default().with_contamination(1.2);
        assert!(matches!(
            detect(&[], &config),
            Err(DetectError::Config(ConfigError::Contamination(_)))
        ));
        assert!(DetectionEngine::new(config).is_err());
    }
}
