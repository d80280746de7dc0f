//! Batch-level metrics for the detection service.

use crate::types::alert::{Alert, Severity};
use crate::types::detection::{AnomalyType, DetectionDiagnostics, DetectionResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Keep at most this many batch timings
const MAX_TIMINGS: usize = 10_000;

/// Metrics collector shared between the batch loop and the reporter
pub struct PipelineMetrics {
    pub batches_processed: AtomicU64,
    /// Batches refused for malformed payloads or invalid input
    pub batches_rejected: AtomicU64,
    pub transactions_processed: AtomicU64,
    pub alerts_generated: AtomicU64,
    pub density_degraded: AtomicU64,
    pub local_density_degraded: AtomicU64,
    alerts_by_severity: RwLock<HashMap<Severity, u64>>,
    detections_by_type: RwLock<HashMap<AnomalyType, u64>>,
    /// Transactions per anomaly score, 0-4
    score_buckets: RwLock<[u64; 5]>,
    /// Batch processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            batches_processed: AtomicU64::new(0),
            batches_rejected: AtomicU64::new(0),
            transactions_processed: AtomicU64::new(0),
            alerts_generated: AtomicU64::new(0),
            density_degraded: AtomicU64::new(0),
            local_density_degraded: AtomicU64::new(0),
            alerts_by_severity: RwLock::new(HashMap::new()),
            detections_by_type: RwLock::new(HashMap::new()),
            score_buckets: RwLock::new([0; 5]),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    /// Record one completed detection pass
    pub fn record_batch(
        &self,
        processing_time: Duration,
        results: &[DetectionResult],
        diagnostics: &DetectionDiagnostics,
    ) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
        self.transactions_processed
            .fetch_add(results.len() as u64, Ordering::Relaxed);

        if diagnostics.density_degraded {
            self.density_degraded.fetch_add(1, Ordering::Relaxed);
        }
        if diagnostics.local_density_degraded {
            self.local_density_degraded.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            if times.len() > MAX_TIMINGS {
                times.drain(0..MAX_TIMINGS / 2);
            }
        }

        if let Ok(mut buckets) = self.score_buckets.write() {
            for result in results {
                buckets[(result.anomaly_score as usize).min(4)] += 1;
            }
        }

        if let Ok(mut by_type) = self.detections_by_type.write() {
            for result in results.iter().filter(|r| r.is_detected_anomaly) {
                *by_type.entry(result.detected_anomaly_type).or_insert(0) += 1;
            }
        }
    }

    pub fn record_rejected_batch(&self) {
        self.batches_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alerts(&self, alerts: &[Alert]) {
        self.alerts_generated
            .fetch_add(alerts.len() as u64, Ordering::Relaxed);

        if let Ok(mut by_severity) = self.alerts_by_severity.write() {
            for alert in alerts {
                *by_severity.entry(alert.severity()).or_insert(0) += 1;
            }
        }
    }

    /// Get batch processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let mut sorted = match self.processing_times.read() {
            Ok(times) if !times.is_empty() => times.clone(),
            _ => return ProcessingStats::default(),
        };
        sorted.sort_unstable();

        let count = sorted.len();
        let sum: u64 = sorted.iter().sum();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.5),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Transactions per second since startup
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.transactions_processed.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 5] {
        self.score_buckets.read().map(|b| *b).unwrap_or_default()
    }

    pub fn get_alerts_by_severity(&self) -> HashMap<Severity, u64> {
        self.alerts_by_severity
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn get_detections_by_type(&self) -> HashMap<AnomalyType, u64> {
        self.detections_by_type
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let batches = self.batches_processed.load(Ordering::Relaxed);
        let rejected = self.batches_rejected.load(Ordering::Relaxed);
        let tx_count = self.transactions_processed.load(Ordering::Relaxed);
        let alert_count = self.alerts_generated.load(Ordering::Relaxed);
        let alert_rate = if tx_count > 0 {
            (alert_count as f64 / tx_count as f64) * 100.0
        } else {
            0.0
        };

        let processing = self.get_processing_stats();
        let throughput = self.get_throughput();
        let score_dist = self.get_score_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║         TRANSACTION ANOMALY DETECTOR - METRICS SUMMARY       ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Batches Processed:      {:>8}  │  Rejected:   {:>8}    ║",
            batches, rejected
        );
        info!(
            "║ Transactions Processed: {:>8}  │  Throughput: {:>6.1} tx/s ║",
            tx_count, throughput
        );
        info!(
            "║ Alerts Generated:       {:>8}  │  Alert Rate: {:>6.1}%     ║",
            alert_count, alert_rate
        );
        info!(
            "║ Degraded Batches: density={:>6} local_density={:>6}        ║",
            self.density_degraded.load(Ordering::Relaxed),
            self.local_density_degraded.load(Ordering::Relaxed)
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Batch Time (μs): mean={:>7} p50={:>7} p95={:>7} max={:>7} ║",
            processing.mean_us, processing.p50_us, processing.p95_us, processing.max_us
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Alerts by Severity:                                          ║");
        let by_severity = self.get_alerts_by_severity();
        for severity in [Severity::High, Severity::Medium] {
            let count = by_severity.get(&severity).copied().unwrap_or(0);
            info!("║   {:10}: {:>8}                                         ║", severity.as_str(), count);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Detections by Type:                                          ║");
        let mut by_type: Vec<(AnomalyType, u64)> = self.get_detections_by_type().into_iter().collect();
        by_type.sort();
        for (anomaly_type, count) in by_type {
            info!("║   {:20}: {:>8}                               ║", anomaly_type.as_str(), count);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Anomaly Score Distribution:                                  ║");
        let total: u64 = score_dist.iter().sum();
        for (score, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 { (count as f64 / total as f64) * 100.0 } else { 0.0 };
            let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
            info!("║   {}/4: {:>8} ({:>5.1}%) {}", score, count, pct, bar);
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Batch processing time statistics
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodic metrics summary
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
