//! Transaction Anomaly Detector - Main Entry Point
//!
//! Consumes transaction batches from NATS, scores each batch with the detector
//! ensemble, and publishes alerts and per-batch results.

use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use transaction_anomaly_detector::{
    config::{AppConfig, LoggingConfig},
    consumer::BatchConsumer,
    engine::DetectionEngine,
    evaluation::Evaluation,
    feature_extractor::FeatureExtractor,
    metrics::{MetricsReporter, PipelineMetrics},
    producer::AlertProducer,
};

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(
        format!("transaction_anomaly_detector={}", logging.level)
            .parse()
            .context("invalid logging.level")?,
    );

    if logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!("Starting Transaction Anomaly Detector");

    let detection = &config.detection;
    info!(
        contamination = detection.contamination,
        z_threshold = detection.z_threshold,
        max_value_single = detection.max_value_single,
        suspicious_hours = ?detection.suspicious_hours,
        max_tx_per_hour = detection.max_tx_per_hour,
        rapid_interval_seconds = detection.rapid_interval_seconds,
        "Configuration loaded"
    );

    let engine = DetectionEngine::new(config.detection.clone())
        .context("invalid detection configuration")?;
    info!(
        features = FeatureExtractor::new().feature_count(),
        trees = engine.config().n_estimators,
        neighbors = engine.config().n_neighbors,
        "Detection engine ready"
    );

    let metrics = Arc::new(PipelineMetrics::new());

    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = BatchConsumer::new(
        client.clone(),
        &config.nats.transaction_subject,
        config.pipeline.max_batch_size,
    );
    let producer = AlertProducer::new(
        client.clone(),
        &config.nats.alert_subject,
        &config.nats.result_subject,
    );
    info!("Publishing alerts to: {}", producer.alert_subject());
    info!("Publishing results to: {}", producer.result_subject());

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
    tokio::spawn(reporter.start());

    let mut subscription = consumer.subscribe().await?;

    // One batch at a time: the next message waits until this one is published
    while let Some(message) = subscription.next().await {
        let start_time = Instant::now();

        let batch = match consumer.decode(&message) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Rejected transaction batch");
                metrics.record_rejected_batch();
                continue;
            }
        };

        let outcome = match engine.detect(&batch) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(batch_size = batch.len(), error = %e, "Rejected transaction batch");
                metrics.record_rejected_batch();
                continue;
            }
        };

        let processing_time = start_time.elapsed();
        metrics.record_batch(processing_time, outcome.results(), outcome.diagnostics());
        metrics.record_alerts(outcome.alerts());

        if let Some(evaluation) = Evaluation::from_batch(&batch, outcome.results()) {
            evaluation.log();
        }

        let published = producer.publish_batch(outcome.alerts()).await;
        if let Err(e) = producer.publish_results(outcome.results()).await {
            error!(
                batch_size = batch.len(),
                error = %e,
                "Failed to publish detection results"
            );
        }

        info!(
            batch_size = batch.len(),
            anomalies = outcome.diagnostics().anomalies_detected,
            alerts_published = published,
            processing_time_ms = processing_time.as_millis() as u64,
            "Batch processed"
        );
    }

    info!("Detector shutting down...");
    metrics.print_summary();

    Ok(())
}
