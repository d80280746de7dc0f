//! Small numeric helpers shared by the detectors.

/// Mean and sample (n - 1) standard deviation. The deviation is 0 for fewer
/// than two values.
pub fn mean_and_sample_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let sq_diff: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (mean, (sq_diff / (n - 1.0)).sqrt())
}

/// Percentile with linear interpolation between closest ranks, `q` in [0, 100].
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Flags the values strictly below the `contamination` quantile.
pub fn flag_lowest(scores: &[f64], contamination: f64) -> Vec<bool> {
    let threshold = percentile(scores, contamination * 100.0);
    scores.iter().map(|&s| s < threshold).collect()
}

/// Column-wise standardization to zero mean and unit (population) variance.
///
/// Fitted on the batch being scored and discarded afterwards. Constant
/// columns keep a scale of 1 so they map to 0.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let dims = rows.first().map(|r| r.len()).unwrap_or(0);
        let n = rows.len().max(1) as f64;

        let mut means = vec![0.0; dims];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v / n;
            }
        }

        let mut scales = vec![0.0; dims];
        for row in rows {
            for ((s, v), m) in scales.iter_mut().zip(row).zip(&means) {
                *s += (v - m).powi(2) / n;
            }
        }
        for s in scales.iter_mut() {
            *s = s.sqrt();
            if *s <= f64::EPSILON {
                *s = 1.0;
            }
        }

        Self { means, scales }
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| {
                row.iter()
                    .zip(self.means.iter().zip(&self.scales))
                    .map(|(v, (m, s))| (v - m) / s)
                    .collect()
            })
            .collect()
    }

    pub fn fit_transform(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        Self::fit(rows).transform(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_sample_std() {
        let (mean, std) = mean_and_sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-12);
        assert!((std - 2.138089935).abs() < 1e-6);

        assert_eq!(mean_and_sample_std(&[42.0]), (42.0, 0.0));
        assert_eq!(mean_and_sample_std(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 50.0), 3.0);
        assert_eq!(percentile(&values, 100.0), 5.0);
        assert!((percentile(&values, 10.0) - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_flag_lowest() {
        let scores = [-0.9, -0.4, -0.41, -0.39, -0.42, -0.4, -0.38, -0.43, -0.41, -0.4];
        let flags = flag_lowest(&scores, 0.1);
        assert_eq!(flags.iter().filter(|&&f| f).count(), 1);
        assert!(flags[0]);

        // Ties at the threshold are not flagged
        assert!(flag_lowest(&[1.0, 1.0, 1.0], 0.05).iter().all(|&f| !f));
    }

    #[test]
    fn test_standard_scaler() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaled = StandardScaler::fit_transform(&rows);
        assert_eq!(scaled[0], vec![-1.0, 0.0]);
        assert_eq!(scaled[1], vec![1.0, 0.0]);
    }
}
