//! NATS producer for alerts and detection results

use crate::types::alert::Alert;
use crate::types::detection::DetectionResult;
use anyhow::Result;
use async_nats::Client;
use tracing::{debug, error};

/// Publishes alerts one per message and results one array per batch
#[derive(Clone)]
pub struct AlertProducer {
    client: Client,
    alert_subject: String,
    result_subject: String,
}

impl AlertProducer {
    pub fn new(client: Client, alert_subject: &str, result_subject: &str) -> Self {
        Self {
            client,
            alert_subject: alert_subject.to_string(),
            result_subject: result_subject.to_string(),
        }
    }

    /// Publish an anomaly alert
    pub async fn publish(&self, alert: &Alert) -> Result<()> {
        let payload = serde_json::to_vec(alert)?;

        self.client
            .publish(self.alert_subject.clone(), payload.into())
            .await?;

        debug!(
            alert_id = %alert.alert_id(),
            transaction_id = %alert.transaction_id(),
            severity = alert.severity().as_str(),
            anomaly_type = %alert.anomaly_type(),
            "Published anomaly alert"
        );

        Ok(())
    }

    /// Publish alerts one by one; a failed alert is logged and skipped
    pub async fn publish_batch(&self, alerts: &[Alert]) -> usize {
        let mut published = 0;
        for alert in alerts {
            match self.publish(alert).await {
                Ok(()) => published += 1,
                Err(e) => error!(
                    alert_id = %alert.alert_id(),
                    error = %e,
                    "Failed to publish alert"
                ),
            }
        }
        published
    }

    /// Publish the full result set of one batch as a single JSON array
    pub async fn publish_results(&self, results: &[DetectionResult]) -> Result<()> {
        let payload = serde_json::to_vec(results)?;

        self.client
            .publish(self.result_subject.clone(), payload.into())
            .await?;

        debug!(
            subject = %self.result_subject,
            results = results.len(),
            "Published detection results"
        );

        Ok(())
    }

    pub fn alert_subject(&self) -> &str {
        &self.alert_subject
    }

    pub fn result_subject(&self) -> &str {
        &self.result_subject
    }
}

#[cfg(test)]
mod tests {
    // Integration tests would require a running NATS server
}
