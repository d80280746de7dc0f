//! NATS consumer for incoming transaction batches

use crate::error::InputError;
use crate::types::transaction::Transaction;
use anyhow::Result;
use async_nats::{Client, Message, Subscriber};
use tracing::info;

/// Receives transaction batches, one JSON array per message
pub struct BatchConsumer {
    client: Client,
    subject: String,
    max_batch_size: usize,
}

impl BatchConsumer {
    pub fn new(client: Client, subject: &str, max_batch_size: usize) -> Self {
        Self {
            client,
            subject: subject.to_string(),
            max_batch_size,
        }
    }

    /// Subscribe to the batch subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self.client.subscribe(self.subject.clone()).await?;
        info!(
            subject = %self.subject,
            max_batch_size = self.max_batch_size,
            "Subscribed to transaction batch subject"
        );
        Ok(subscriber)
    }

    /// Decode a message into a batch, refusing oversized ones
    pub fn decode(&self, message: &Message) -> Result<Vec<Transaction>, InputError> {
        decode_batch(&message.payload, self.max_batch_size)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

fn decode_batch(payload: &[u8], max_batch_size: usize) -> Result<Vec<Transaction>, InputError> {
    let batch = Transaction::parse_batch(payload)?;
    if batch.len() > max_batch_size {
        return Err(InputError::BatchTooLarge {
            size: batch.len(),
            limit: max_batch_size,
        });
    }
    Ok(batch)
}
