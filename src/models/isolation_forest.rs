//! Isolation forest density detector.
//!
//! Points that random axis-aligned splits separate in few steps get short
//! average path lengths and therefore low scores. The forest is grown from
//! the batch being scored and dropped after the call.

use crate::models::stats::{flag_lowest, StandardScaler};
use crate::types::features::FeatureRow;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tracing::debug;

/// Sub-sample size per tree
const MAX_SAMPLES: usize = 256;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Output of one density detection pass, aligned with the input rows
#[derive(Debug, Clone, PartialEq)]
pub struct DensityOutput {
    pub flags: Vec<bool>,
    /// `-2^(-E[h(x)] / c(psi))`, more negative = more anomalous
    pub scores: Vec<f64>,
    /// True when the batch was too small and every row was left unflagged
    pub degraded: bool,
}

/// Seeded isolation forest over the standardized density feature vector.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    n_estimators: usize,
    contamination: f64,
    min_samples: usize,
    seed: u64,
}

impl IsolationForest {
    pub fn new(n_estimators: usize, contamination: f64, min_samples: usize, seed: u64) -> Self {
        Self {
            n_estimators,
            contamination,
            // A single sample has no defined average path length
            min_samples: min_samples.max(2),
            seed,
        }
    }

    /// Fit on `rows` and score the same rows.
    pub fn detect(&self, rows: &[FeatureRow]) -> DensityOutput {
        let n = rows.len();
        if n < self.min_samples {
            debug!(
                batch_size = n,
                min_samples = self.min_samples,
                "Batch too small for isolation forest"
            );
            return DensityOutput {
                flags: vec![false; n],
                scores: vec![0.0; n],
                degraded: true,
            };
        }

        let raw: Vec<Vec<f64>> = rows.iter().map(FeatureRow::density_vector).collect();
        let data = StandardScaler::fit_transform(&raw);

        let sample_size = n.min(MAX_SAMPLES);
        let max_depth = (sample_size as f64).log2().ceil() as usize;
        let mut rng = ChaCha20Rng::seed_from_u64(self.seed);

        let trees: Vec<IsolationTree> = (0..self.n_estimators)
            .map(|_| {
                let sample = index::sample(&mut rng, n, sample_size).into_vec();
                IsolationTree::grow(&data, sample, max_depth, &mut rng)
            })
            .collect();

        let normalizer = average_path_length(sample_size);
        let scores: Vec<f64> = data
            .iter()
            .map(|point| {
                let mean_depth = trees.iter().map(|t| t.path_length(point)).sum::<f64>()
                    / trees.len() as f64;
                -(2f64.powf(-mean_depth / normalizer))
            })
            .collect();

        let flags = flag_lowest(&scores, self.contamination);

        debug!(
            batch_size = n,
            trees = trees.len(),
            flagged = flags.iter().filter(|&&f| f).count(),
            "Isolation forest scored batch"
        );

        DensityOutput {
            flags,
            scores,
            degraded: false,
        }
    }
}

#[derive(Debug)]
enum IsolationTree {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<IsolationTree>,
        right: Box<IsolationTree>,
    },
}

impl IsolationTree {
    fn grow(data: &[Vec<f64>], rows: Vec<usize>, depth_left: usize, rng: &mut ChaCha20Rng) -> Self {
        if depth_left == 0 || rows.len() <= 1 {
            return IsolationTree::Leaf { size: rows.len() };
        }

        // Only features that still vary within this node can split it
        let dims = data[rows[0]].len();
        let candidates: Vec<(usize, f64, f64)> = (0..dims)
            .filter_map(|feature| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    (lo.min(data[r][feature]), hi.max(data[r][feature]))
                });
                (hi > lo).then_some((feature, lo, hi))
            })
            .collect();

        if candidates.is_empty() {
            return IsolationTree::Leaf { size: rows.len() };
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let threshold = rng.gen_range(lo..hi);

        let (left, right): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| data[r][feature] <= threshold);

        IsolationTree::Split {
            feature,
            threshold,
            left: Box::new(Self::grow(data, left, depth_left - 1, rng)),
            right: Box::new(Self::grow(data, right, depth_left - 1, rng)),
        }
    }

    fn path_length(&self, point: &[f64]) -> f64 {
        let mut node = self;
        let mut depth = 0.0;
        loop {
            match node {
                IsolationTree::Leaf { size } => return depth + average_path_length(*size),
                IsolationTree::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if point[*feature] <= *threshold {
                        left.as_ref()
                    } else {
                        right.as_ref()
                    };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::FeatureExtractor;
    use crate::types::transaction::{parse_timestamp, Transaction};

    fn batch_with_outlier() -> Vec<FeatureRow> {
        let mut batch: Vec<Transaction> = (0..40)
            .map(|i| {
                Transaction::new(
                    format!("tx_{:03}", i),
                    format!("USER_{}", 1000 + i % 8),
                    100.0 + (i % 7) as f64 * 5.0,
                    parse_timestamp(&format!("2024-03-01T{:02}:{:02}:00", 9 + i % 8, i)).unwrap(),
                )
            })
            .collect();
        batch.push(Transaction::new(
            "tx_outlier",
            "USER_9999",
            48_000.0,
            parse_timestamp("2024-03-01T03:00:00").unwrap(),
        ));
        FeatureExtractor::new().extract(&batch)
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!((average_path_length(256) - 10.2448).abs() < 1e-3);
    }

    #[test]
    fn test_flags_obvious_outlier() {
        let rows = batch_with_outlier();
        let output = IsolationForest::new(100, 0.05, 10, 42).detect(&rows);

        assert!(!output.degraded);
        assert_eq!(output.flags.len(), rows.len());
        assert!(output.flags[rows.len() - 1]);

        let outlier_score = output.scores[rows.len() - 1];
        assert!(output.scores.iter().all(|&s| s >= outlier_score));
        assert!(output.scores.iter().all(|&s| (-1.0..0.0).contains(&s)));
    }

    #[test]
    fn test_deterministic_for_same_seed() {
        let rows = batch_with_outlier();
        let forest = IsolationForest::new(50, 0.05, 10, 7);

        assert_eq!(forest.detect(&rows), forest.detect(&rows));
    }

    #[test]
    fn test_degrades_below_minimum_batch() {
        let rows = batch_with_outlier();
        let output = IsolationForest::new(100, 0.05, 10, 42).detect(&rows[..5]);

        assert!(output.degraded);
        assert_eq!(output.flags, vec![false; 5]);
        assert_eq!(output.scores, vec![0.0; 5]);
    }
}
