// End-to-end tests for the producer pipeline.
//
// A live broker is not required: the scheduler is built from a
// ProducerConfig and driven through an in-memory transport.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use telemetry_producer::generator::Band;
use telemetry_producer::{DrainOutcome, ProducerConfig, Scheduler, Transport, TransportError};
use tokio_util::sync::CancellationToken;

// ── Test transport ────────────────────────────────────────────────────────────

/// Consumer-side view of a published record
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Record {
    entity_id: String,
    value: i64,
    timestamp: i64,
}

/// Broker stand-in that drops every `fail_every`-th send attempt
#[derive(Default)]
struct MemoryBroker {
    records: Mutex<Vec<(String, Record)>>,
    attempts: AtomicU32,
    fail_every: u32,
}

#[async_trait]
impl Transport for MemoryBroker {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_every > 0 && attempt % self.fail_every == 0 {
            return Err(TransportError::Publish("connection reset".to_string()));
        }
        let record: Record = serde_json::from_slice(&payload).expect("valid JSON record");
        self.records.lock().unwrap().push((topic.to_string(), record));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

fn producer_config(toml: &str) -> ProducerConfig {
    toml::from_str(toml).unwrap()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_bounded_run_publishes_every_entity_each_tick() {
    let config = producer_config(
        r#"
        max_ticks = 4
        seed = 42

        [broker]
        address = "nats://localhost:4222"
        "#,
    );
    let broker = Arc::new(MemoryBroker::default());
    let scheduler = Scheduler::from_config(&config, Arc::clone(&broker)).unwrap();

    let summary = scheduler.run(CancellationToken::new()).await;

    assert_eq!(summary.ticks, 4);
    assert_eq!(summary.submitted, 12);
    assert_eq!(summary.delivered, 12);
    assert_eq!(summary.drain, DrainOutcome::Clean);

    let records = broker.records.lock().unwrap();
    assert_eq!(records.len(), 12);
    for (i, (topic, record)) in records.iter().enumerate() {
        assert_eq!(topic, "sensor-suhu-gudang");
        assert_eq!(record.entity_id, ["G1", "G2", "G3"][i % 3]);
        assert!(config.generator.classify(record.value).is_some());
        assert!(record.timestamp > 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_flaky_broker_is_absorbed_by_retries() {
    let config = producer_config(
        r#"
        entities = ["W1", "W2", "W3", "W4"]
        max_ticks = 5
        seed = 7

        [broker]
        address = "nats://localhost:4222"
        "#,
    );
    let broker = Arc::new(MemoryBroker {
        fail_every: 3,
        ..Default::default()
    });
    let scheduler = Scheduler::from_config(&config, Arc::clone(&broker)).unwrap();

    let summary = scheduler.run(CancellationToken::new()).await;

    assert_eq!(summary.submitted, 20);
    assert_eq!(summary.delivered, 20);
    assert_eq!(summary.failed, 0);
    assert!(broker.attempts.load(Ordering::SeqCst) > 20);
    assert_eq!(broker.records.lock().unwrap().len(), 20);
}

#[tokio::test(start_paused = true)]
async fn test_same_seed_reproduces_values() {
    let toml = r#"
        max_ticks = 10
        seed = 1234

        [broker]
        address = "nats://localhost:4222"
    "#;

    let mut runs = Vec::new();
    for _ in 0..2 {
        let broker = Arc::new(MemoryBroker::default());
        let scheduler = Scheduler::from_config(&producer_config(toml), Arc::clone(&broker)).unwrap();
        scheduler.run(CancellationToken::new()).await;

        let values: Vec<i64> = broker
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.value)
            .collect();
        runs.push(values);
    }

    assert_eq!(runs[0].len(), 30);
    assert_eq!(runs[0], runs[1]);
}

#[tokio::test(start_paused = true)]
async fn test_anomaly_counter_matches_published_values() {
    let config = producer_config(
        r#"
        max_ticks = 50
        seed = 3

        [broker]
        address = "nats://localhost:4222"
        "#,
    );
    let broker = Arc::new(MemoryBroker::default());
    let scheduler = Scheduler::from_config(&config, Arc::clone(&broker)).unwrap();

    let summary = scheduler.run(CancellationToken::new()).await;

    let anomalous = broker
        .records
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, r)| config.generator.classify(r.value) == Some(Band::Anomalous))
        .count() as u64;
    assert_eq!(summary.anomalous, anomalous);
}

#[test]
fn test_invalid_config_is_rejected_before_running() {
    let config = producer_config(
        r#"
        tick_interval_ms = 0

        [broker]
        address = "nats://localhost:4222"
        "#,
    );
    let broker = Arc::new(MemoryBroker::default());

    let result = Scheduler::from_config(&config, broker);
    assert!(matches!(
        result,
        Err(telemetry_producer::ConfigError::ZeroTickInterval)
    ));
}
