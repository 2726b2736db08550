//! Delivery client: serializes readings, queues them, and publishes with
//! bounded exponential backoff.
//!
//! Two-phase contract: [`DeliveryClient::publish`] enqueues,
//! [`DeliveryClient::flush`] sends the queue and waits for broker acks.

mod error;
mod transport;


pub use error::{DeliveryError, FlushError, TransportError};
pub use transport::Transport;

use crate::config::ConfigError;
use crate::reading::Reading;
use futures::future::join_all;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Delivery tuning
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeliveryConfig {
    /// Total send attempts per record, first attempt included
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    5000
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl DeliveryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        if !(self.backoff_multiplier >= 1.0 && self.backoff_multiplier.is_finite()) {
            return Err(ConfigError::InvalidBackoff(format!(
                "backoff_multiplier must be >= 1, got {}",
                self.backoff_multiplier
            )));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ConfigError::InvalidBackoff(format!(
                "max_backoff_ms ({}) is below initial_backoff_ms ({})",
                self.max_backoff_ms, self.initial_backoff_ms
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            multiplier: self.backoff_multiplier,
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        DeliveryConfig::default().retry_policy()
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Receipt for an enqueued reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Monotonically increasing per client
    pub sequence: u64,
}

struct PendingRecord {
    sequence: u64,
    topic: String,
    payload: Vec<u8>,
    reading: Reading,
}

/// Owns the broker transport and the queue of records awaiting `flush`.
pub struct DeliveryClient<T: Transport> {
    transport: T,
    retry: RetryPolicy,
    pending: Vec<PendingRecord>,
    next_sequence: u64,
    closed: bool,
}

impl<T: Transport> DeliveryClient<T> {
    pub fn new(transport: T, retry: RetryPolicy) -> Self {
        Self {
            transport,
            retry,
            pending: Vec::new(),
            next_sequence: 0,
            closed: false,
        }
    }

    /// Serialize a reading and enqueue it for the next flush.
    pub fn publish(&mut self, topic: &str, reading: Reading) -> Result<Ack, DeliveryError> {
        if topic.is_empty() {
            return Err(DeliveryError::EmptyTopic);
        }

        let payload = match serde_json::to_vec(&reading) {
            Ok(payload) => payload,
            Err(source) => return Err(DeliveryError::Encode { reading, source }),
        };

        self.next_sequence += 1;
        let sequence = self.next_sequence;

        debug!(
            sequence = sequence,
            topic = %topic,
            entity_id = %reading.entity_id(),
            value = reading.value(),
            "Enqueued reading"
        );

        self.pending.push(PendingRecord {
            sequence,
            topic: topic.to_string(),
            payload,
            reading,
        });

        Ok(Ack { sequence })
    }

    /// Number of records waiting for the next flush
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Send every pending record and wait until each one is acknowledged or
    /// has exhausted its retries.
    ///
    /// Sends start in submission order. An empty queue returns immediately.
    pub async fn flush(&mut self) -> Result<(), FlushError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.pending);
        let attempted = batch.len();
        let transport = &self.transport;
        let retry = &self.retry;

        let results = join_all(
            batch
                .into_iter()
                .map(|record| deliver_with_retry(transport, retry, record)),
        )
        .await;

        let failures: Vec<DeliveryError> = results.into_iter().filter_map(Result::err).collect();

        if failures.is_empty() {
            debug!(count = attempted, "Flushed readings");
            Ok(())
        } else {
            Err(FlushError {
                attempted,
                failures,
            })
        }
    }

    /// Release the broker connection. Safe to call more than once.
    pub async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if !self.pending.is_empty() {
            warn!(
                count = self.pending.len(),
                "Closing delivery client with unflushed readings"
            );
        }

        self.transport.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

async fn deliver_with_retry<T: Transport>(
    transport: &T,
    retry: &RetryPolicy,
    record: PendingRecord,
) -> Result<(), DeliveryError> {
    let mut attempt = 1;

    loop {
        match send_once(transport, &record).await {
            Ok(()) => return Ok(()),
            Err(DeliveryError::Transient(source)) if attempt >= retry.max_attempts => {
                return Err(DeliveryError::Unretryable {
                    reading: record.reading,
                    attempts: attempt,
                    source,
                });
            }
            Err(DeliveryError::Transient(e)) => {
                let delay = retry.backoff(attempt);
                warn!(
                    sequence = record.sequence,
                    entity_id = %record.reading.entity_id(),
                    attempt = attempt,
                    max_attempts = retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Publish failed, will retry"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(other) => return Err(other),
        }
    }
}

async fn send_once<T: Transport>(transport: &T, record: &PendingRecord) -> Result<(), DeliveryError> {
    transport
        .send(&record.topic, record.payload.clone())
        .await
        .map_err(DeliveryError::Transient)
}
