//! Vote fusion and anomaly type classification.

use crate::types::detection::AnomalyType;

/// Detector votes needed to call a transaction anomalous.
///
/// This is a fixed 2-of-4 threshold, not a majority: two detectors agreeing
/// is enough even when the other two disagree.
pub const DETECTION_VOTES: u8 = 2;

/// Binary verdicts of the four detectors for one transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verdicts {
    pub density: bool,
    pub statistical: bool,
    pub local_density: bool,
    pub rule_based: bool,
}

impl Verdicts {
    /// Number of detectors that fired, 0-4
    pub fn anomaly_score(&self) -> u8 {
        [
            self.density,
            self.statistical,
            self.local_density,
            self.rule_based,
        ]
        .iter()
        .filter(|&&v| v)
        .count() as u8
    }

    pub fn is_detected(&self) -> bool {
        self.anomaly_score() >= DETECTION_VOTES
    }
}

/// Gap below which a detected transaction is classified as part of a rapid
/// sequence. Independent of the configurable interval used by rule R4.
pub const RAPID_SEQUENCE_SECONDS: f64 = 30.0;

/// Facts the classifier looks at for a detected transaction
#[derive(Debug, Clone, Copy)]
pub struct Evidence {
    pub value_z_score: f64,
    pub is_night: bool,
    pub time_since_last: f64,
    pub rules_triggered_count: u8,
}

struct ClassificationRule {
    anomaly_type: AnomalyType,
    matches: fn(&Evidence, &AnomalyClassifier) -> bool,
}

/// Evaluated top to bottom; the first match wins.
const CLASSIFICATION_RULES: [ClassificationRule; 4] = [
    ClassificationRule {
        anomaly_type: AnomalyType::HighValue,
        matches: exceeds_z_threshold,
    },
    ClassificationRule {
        anomaly_type: AnomalyType::UnusualTime,
        matches: at_night,
    },
    ClassificationRule {
        anomaly_type: AnomalyType::RapidSequence,
        matches: follows_too_quickly,
    },
    ClassificationRule {
        anomaly_type: AnomalyType::MultipleRules,
        matches: breaks_several_rules,
    },
];

fn exceeds_z_threshold(e: &Evidence, c: &AnomalyClassifier) -> bool {
    e.value_z_score > c.z_threshold
}

fn at_night(e: &Evidence, _: &AnomalyClassifier) -> bool {
    e.is_night
}

fn follows_too_quickly(e: &Evidence, _: &AnomalyClassifier) -> bool {
    e.time_since_last < RAPID_SEQUENCE_SECONDS
}

fn breaks_several_rules(e: &Evidence, _: &AnomalyClassifier) -> bool {
    e.rules_triggered_count > 1
}

/// Picks the single most likely anomaly type for a detected transaction.
#[derive(Debug, Clone)]
pub struct AnomalyClassifier {
    z_threshold: f64,
}

impl AnomalyClassifier {
    pub fn new(z_threshold: f64) -> Self {
        Self { z_threshold }
    }

    pub fn classify(&self, verdicts: &Verdicts, evidence: &Evidence) -> AnomalyType {
        if !verdicts.is_detected() {
            return AnomalyType::Normal;
        }

        CLASSIFICATION_RULES
            .iter()
            .find(|rule| (rule.matches)(evidence, self))
            .map(|rule| rule.anomaly_type)
            .unwrap_or(AnomalyType::StatisticalOutlier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evidence() -> Evidence {
        Evidence {
            value_z_score: 0.5,
            is_night: false,
            time_since_last: 3600.0,
            rules_triggered_count: 0,
        }
    }

    fn detected() -> Verdicts {
        Verdicts {
            density: true,
            statistical: false,
            local_density: true,
            rule_based: false,
        }
    }

    #[test]
    fn test_anomaly_score_counts_votes() {
        assert_eq!(Verdicts::default().anomaly_score(), 0);
        assert_eq!(detected().anomaly_score(), 2);
        assert!(detected().is_detected());

        let one = Verdicts {
            rule_based: true,
            ..Verdicts::default()
        };
        assert_eq!(one.anomaly_score(), 1);
        assert!(!one.is_detected());
    }

    #[test]
    fn test_undetected_is_normal() {
        let classifier = AnomalyClassifier::new(3.0);
        let strong = Evidence {
            value_z_score: 9.0,
            is_night: true,
            ..evidence()
        };

        assert_eq!(
            classifier.classify(&Verdicts::default(), &strong),
            AnomalyType::Normal
        );
    }

    #[test]
    fn test_classification_priority() {
        let classifier = AnomalyClassifier::new(3.0);
        let v = detected();

        let all = Evidence {
            value_z_score: 4.0,
            is_night: true,
            time_since_last: 5.0,
            rules_triggered_count: 3,
        };
        assert_eq!(classifier.classify(&v, &all), AnomalyType::HighValue);

        let night = Evidence {
            value_z_score: 1.0,
            ..all
        };
        assert_eq!(classifier.classify(&v, &night), AnomalyType::UnusualTime);

        let rapid = Evidence {
            is_night: false,
            ..night
        };
        assert_eq!(classifier.classify(&v, &rapid), AnomalyType::RapidSequence);

        let multiple = Evidence {
            time_since_last: 45.0,
            ..rapid
        };
        assert_eq!(classifier.classify(&v, &multiple), AnomalyType::MultipleRules);

        let plain = Evidence {
            rules_triggered_count: 1,
            ..multiple
        };
        assert_eq!(classifier.classify(&v, &plain), AnomalyType::StatisticalOutlier);
    }

    #[test]
    fn test_z_threshold_is_strict() {
        let classifier = AnomalyClassifier::new(3.0);
        let at_threshold = Evidence {
            value_z_score: 3.0,
            ..evidence()
        };
        assert_eq!(
            classifier.classify(&detected(), &at_threshold),
            AnomalyType::StatisticalOutlier
        );
    }

    #[test]
    fn test_rapid_sequence_uses_fixed_gap() {
        let classifier = AnomalyClassifier::new(3.0);
        let just_under = Evidence {
            time_since_last: 29.9,
            ..evidence()
        };
        let at_gap = Evidence {
            time_since_last: RAPID_SEQUENCE_SECONDS,
            ..evidence()
        };

        assert_eq!(classifier.classify(&detected(), &just_under), AnomalyType::RapidSequence);
        assert_eq!(
            classifier.classify(&detected(), &at_gap),
            AnomalyType::StatisticalOutlier
        );
    }
}
