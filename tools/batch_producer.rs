//! Synthetic Batch Producer
//!
//! Generates labelled transaction batches with injected anomaly patterns and
//! publishes them to NATS. Without a NATS server it scores the batches locally
//! and logs detection quality instead.

use chrono::{Duration as ChronoDuration, NaiveDateTime, Timelike, Utc};
use rand::Rng;
use std::time::Duration;
use tracing::{info, warn};
use transaction_anomaly_detector::{detect, evaluation::Evaluation, DetectionConfig, Transaction};
use uuid::Uuid;

const TYPES: [&str; 5] = ["PIX", "TED", "Boleto", "Cartão Débito", "Cartão Crédito"];
const DEVICES: [&str; 3] = ["Mobile", "Desktop", "Tablet"];
const MERCHANTS: [&str; 6] = [
    "Mercado Silva",
    "Farmácia Central",
    "Posto Avenida",
    "Livraria Nobre",
    "Cinema Plaza",
    "Corretora Atlântica",
];
const CITIES: [(&str, &str); 6] = [
    ("São Paulo", "SP"),
    ("Rio de Janeiro", "RJ"),
    ("Belo Horizonte", "MG"),
    ("Curitiba", "PR"),
    ("Salvador", "BA"),
    ("Recife", "PE"),
];
const FOREIGN_CITIES: [&str; 4] = ["Tóquio", "Nova York", "Londres", "Dubai"];

/// Category and its usual value range
const CATEGORIES: [(&str, f64, f64); 7] = [
    ("Alimentação", 20.0, 200.0),
    ("Transporte", 10.0, 100.0),
    ("Saúde", 50.0, 500.0),
    ("Educação", 100.0, 1000.0),
    ("Lazer", 30.0, 300.0),
    ("Investimento", 100.0, 5000.0),
    ("Transferência", 50.0, 2000.0),
];

#[derive(Debug, Clone, Copy)]
enum Pattern {
    HighValue,
    RapidSequence,
    UnusualTime,
    UnusualLocation,
    UnusualCombo,
}

const PATTERNS: [Pattern; 5] = [
    Pattern::HighValue,
    Pattern::RapidSequence,
    Pattern::UnusualTime,
    Pattern::UnusualLocation,
    Pattern::UnusualCombo,
];

impl Pattern {
    fn label(self) -> &'static str {
        match self {
            Pattern::HighValue => "high_value",
            Pattern::RapidSequence => "rapid_sequence",
            Pattern::UnusualTime => "unusual_time",
            Pattern::UnusualLocation => "unusual_location",
            Pattern::UnusualCombo => "unusual_combo",
        }
    }
}

/// Labelled batch generator
struct BatchGenerator {
    rng: rand::rngs::ThreadRng,
    /// Batches cover the 24 hours before this instant
    window_start: NaiveDateTime,
}

impl BatchGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            window_start: Utc::now().naive_utc() - ChronoDuration::hours(24),
        }
    }

    /// Generate a batch of roughly `size` transactions, `anomaly_rate` of them anomalous
    fn generate_batch(&mut self, size: usize, anomaly_rate: f64) -> Vec<Transaction> {
        let n_anomalies = (size as f64 * anomaly_rate) as usize;
        let mut batch: Vec<Transaction> = (0..size - n_anomalies).map(|_| self.normal()).collect();

        for _ in 0..n_anomalies {
            let pattern = PATTERNS[self.rng.gen_range(0..PATTERNS.len())];
            batch.extend(self.anomaly(pattern));
        }

        batch.sort_by_key(|tx| tx.timestamp);
        batch
    }

    fn normal(&mut self) -> Transaction {
        let (category, lo, hi) = CATEGORIES[self.rng.gen_range(0..CATEGORIES.len())];
        let (city, state) = CITIES[self.rng.gen_range(0..CITIES.len())];
        let value = (self.rng.gen_range(lo..hi) * 100.0).round() / 100.0;
        let timestamp = self.window_start + ChronoDuration::seconds(self.rng.gen_range(0..86_400));

        let mut tx = Transaction::new(
            Uuid::new_v4().to_string(),
            format!("USER_{}", self.rng.gen_range(1000..10_000)),
            value,
            timestamp,
        )
        .with_category(category)
        .with_type(self.choice(&TYPES))
        .with_device(self.choice(&DEVICES));
        tx.merchant = self.choice(&MERCHANTS).to_string();
        tx.city = city.to_string();
        tx.state = state.to_string();
        tx.is_anomaly = Some(false);
        tx
    }

    fn anomaly(&mut self, pattern: Pattern) -> Vec<Transaction> {
        let mut base = self.normal();
        base.is_anomaly = Some(true);
        base.anomaly_type = Some(pattern.label().to_string());

        match pattern {
            Pattern::HighValue => {
                base.value = (self.rng.gen_range(10_000.0_f64..50_000.0) * 100.0).round() / 100.0;
            }
            Pattern::RapidSequence => {
                // A burst from one user, each a few seconds after the last
                base.user_id = format!("RAPID_{}", self.rng.gen_range(1000..10_000));
                let burst = self.rng.gen_range(4..13);
                let mut burst_txs = Vec::with_capacity(burst);
                let mut timestamp = base.timestamp;
                for _ in 0..burst {
                    let mut tx = base.clone();
                    tx.transaction_id = Uuid::new_v4().to_string();
                    tx.timestamp = timestamp;
                    burst_txs.push(tx);
                    timestamp += ChronoDuration::seconds(self.rng.gen_range(5..25));
                }
                return burst_txs;
            }
            Pattern::UnusualTime => {
                let hour = self.rng.gen_range(0..6);
                let shifted = base
                    .timestamp
                    .with_hour(hour)
                    .unwrap_or(base.timestamp);
                base.timestamp = shifted;
            }
            Pattern::UnusualLocation => {
                base.city = self.choice(&FOREIGN_CITIES).to_string();
                base.state = "EXT".to_string();
            }
            Pattern::UnusualCombo => {
                let (tx_type, category, value) = [
                    ("Boleto", "Lazer", 10_000.0),
                    ("PIX", "Investimento", 50_000.0),
                    ("TED", "Alimentação", 5_000.0),
                ][self.rng.gen_range(0..3)];
                base.tx_type = tx_type.to_string();
                base.category = category.to_string();
                base.value = value;
            }
        }
        vec![base]
    }

    fn choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("batch_producer=info".parse()?)
                .add_directive("transaction_anomaly_detector=info".parse()?),
        )
        .init();

    info!("Starting Synthetic Batch Producer");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("transactions.batch");
    let batches: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(10);
    let batch_size: usize = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(1000);
    let anomaly_rate: f64 = args
        .get(5)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.05f64)
        .clamp(0.0, 1.0);
    let delay_ms: u64 = args.get(6).and_then(|s| s.parse().ok()).unwrap_or(1000);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        batches = batches,
        batch_size = batch_size,
        anomaly_rate = anomaly_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(batches, batch_size, anomaly_rate, delay_ms).await;
        }
    };

    let mut generator = BatchGenerator::new();
    let mut total_transactions = 0;
    let mut total_anomalies = 0;

    for i in 0..batches {
        let batch = generator.generate_batch(batch_size, anomaly_rate);
        let anomalies = batch.iter().filter(|tx| tx.is_anomaly == Some(true)).count();
        total_transactions += batch.len();
        total_anomalies += anomalies;

        let payload = serde_json::to_vec(&batch)?;
        client.publish(subject.to_string(), payload.into()).await?;

        info!(
            batch = i + 1,
            transactions = batch.len(),
            anomalies = anomalies,
            "Published batch"
        );

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    client.flush().await?;

    info!(
        "Completed! Published {} batches ({} transactions, {} labelled anomalies)",
        batches, total_transactions, total_anomalies
    );

    Ok(())
}

async fn run_dry_mode(
    batches: u64,
    batch_size: usize,
    anomaly_rate: f64,
    delay_ms: u64,
) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let config = DetectionConfig::default();
    let mut generator = BatchGenerator::new();

    for i in 0..batches {
        let batch = generator.generate_batch(batch_size, anomaly_rate);
        let outcome = detect(&batch, &config)?;

        info!(
            batch = i + 1,
            transactions = batch.len(),
            alerts = outcome.alerts().len(),
            "Scored batch locally"
        );
        if let Some(evaluation) = Evaluation::from_batch(&batch, outcome.results()) {
            evaluation.log();
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
