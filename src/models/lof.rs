//! Local outlier factor detector.

use crate::models::stats::{flag_lowest, StandardScaler};
use crate::types::features::FeatureRow;
use tracing::debug;

/// Keeps the reachability density finite when neighbours coincide
const LRD_EPSILON: f64 = 1e-10;

/// Output of one local-density pass, aligned with the input rows
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDensityOutput {
    pub flags: Vec<bool>,
    /// Negative outlier factor, lower = more anomalous (about -1 for inliers)
    pub scores: Vec<f64>,
    pub effective_neighbors: usize,
    pub degraded: bool,
}

/// Compares each point's reachability density with that of its k nearest
/// neighbours over the standardized reduced feature set.
#[derive(Debug, Clone)]
pub struct LocalOutlierFactor {
    n_neighbors: usize,
    contamination: f64,
}

impl LocalOutlierFactor {
    pub fn new(n_neighbors: usize, contamination: f64) -> Self {
        Self {
            n_neighbors,
            contamination,
        }
    }

    pub fn detect(&self, rows: &[FeatureRow]) -> LocalDensityOutput {
        let n = rows.len();
        if n < 2 {
            return LocalDensityOutput {
                flags: vec![false; n],
                scores: vec![0.0; n],
                effective_neighbors: 0,
                degraded: true,
            };
        }

        let k = self.n_neighbors.min(n - 1);
        let raw: Vec<Vec<f64>> = rows.iter().map(FeatureRow::local_density_vector).collect();
        let data = StandardScaler::fit_transform(&raw);

        let neighbors: Vec<Vec<(usize, f64)>> =
            (0..n).map(|i| nearest_neighbors(&data, i, k)).collect();

        // Distance to the k-th neighbour
        let k_distance: Vec<f64> = neighbors
            .iter()
            .map(|nn| nn.last().map(|&(_, d)| d).unwrap_or(0.0))
            .collect();

        let lrd: Vec<f64> = neighbors
            .iter()
            .map(|nn| {
                let mean_reach = nn
                    .iter()
                    .map(|&(j, d)| d.max(k_distance[j]))
                    .sum::<f64>()
                    / nn.len() as f64;
                1.0 / (mean_reach + LRD_EPSILON)
            })
            .collect();

        let scores: Vec<f64> = neighbors
            .iter()
            .enumerate()
            .map(|(i, nn)| {
                let ratio = nn.iter().map(|&(j, _)| lrd[j] / lrd[i]).sum::<f64>() / nn.len() as f64;
                -ratio
            })
            .collect();

        let flags = flag_lowest(&scores, self.contamination);

        debug!(
            batch_size = n,
            k = k,
            flagged = flags.iter().filter(|&&f| f).count(),
            "Local outlier factor scored batch"
        );

        LocalDensityOutput {
            flags,
            scores,
            effective_neighbors: k,
            degraded: false,
        }
    }
}

/// The `k` nearest other points to `data[i]` as `(index, distance)`,
/// closest first; equal distances are ordered by index.
fn nearest_neighbors(data: &[Vec<f64>], i: usize, k: usize) -> Vec<(usize, f64)> {
    let mut distances: Vec<(usize, f64)> = data
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != i)
        .map(|(j, other)| (j, euclidean(&data[i], other)))
        .collect();
    distances.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    distances.truncate(k);
    distances
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::FeatureExtractor;
    use crate::types::transaction::{parse_timestamp, Transaction};

    fn rows(values: &[f64]) -> Vec<FeatureRow> {
        let batch: Vec<Transaction> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                Transaction::new(
                    format!("tx_{}", i),
                    format!("USER_{}", i),
                    v,
                    parse_timestamp("2024-03-01T12:00:00").unwrap(),
                )
            })
            .collect();
        FeatureExtractor::new().extract(&batch)
    }

    #[test]
    fn test_flags_isolated_point() {
        let mut values: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        values.push(900.0);
        let rows = rows(&values);

        let output = LocalOutlierFactor::new(20, 0.05).detect(&rows);

        assert!(!output.degraded);
        assert_eq!(output.effective_neighbors, 20);
        assert!(output.flags[30]);
        assert!(output.scores[30] < -2.0);
        assert!(output.scores[..30].iter().all(|&s| s > output.scores[30]));
    }

    #[test]
    fn test_clamps_neighbors_to_batch_size() {
        let output = LocalOutlierFactor::new(20, 0.05).detect(&rows(&[10.0, 12.0, 11.0, 500.0]));

        assert_eq!(output.effective_neighbors, 3);
        assert_eq!(output.scores.len(), 4);
        assert!(output.scores.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_single_row_disables_detector() {
        let output = LocalOutlierFactor::new(20, 0.05).detect(&rows(&[42.0]));

        assert!(output.degraded);
        assert_eq!(output.flags, vec![false]);
        assert_eq!(output.scores, vec![0.0]);
    }

    #[test]
    fn test_identical_points_are_not_flagged() {
        let output = LocalOutlierFactor::new(20, 0.1).detect(&rows(&[50.0; 12]));

        assert!(output.flags.iter().all(|&f| !f));
    }
}
