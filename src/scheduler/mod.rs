//! Tick loop and shutdown state machine.
//!
//! ```text
//! Idle ──run()──▶ Running ──cancel / tick limit──▶ Draining ──in-flight done / timeout──▶ Stopped
//! ```
//!
//! Each tick generates one reading per entity (in entity order), publishes
//! them, then flushes. Ticks never overlap: a slow flush delays the next tick.
//! Cancellation is observed at tick boundaries; a flush already in progress
//! is awaited for at most the drain timeout.

use crate::config::{ConfigError, ProducerConfig};
use crate::delivery::{DeliveryClient, DeliveryError, Transport};
use crate::generator::{Band, ReadingGenerator};
use crate::reading::EntitySet;
use rand::rngs::StdRng;
use rand::Rng;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};


/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Draining,
    Stopped,
}

/// How the drain phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Clean,
    /// In-flight work was abandoned after the drain timeout
    TimedOut,
}

/// Drain did not complete within the configured bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("drain did not complete within {0:?}")]
pub struct ShutdownTimeout(pub Duration);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub topic: String,
    pub tick_interval: Duration,
    pub drain_timeout: Duration,
    pub max_ticks: Option<u64>,
}

impl SchedulerConfig {
    pub fn from_config(config: &ProducerConfig) -> Self {
        Self {
            topic: config.broker.topic.clone(),
            tick_interval: config.tick_interval(),
            drain_timeout: config.drain_timeout(),
            max_ticks: config.max_ticks,
        }
    }
}

/// Result of a single tick
#[derive(Debug)]
pub struct TickReport {
    pub tick: u64,
    pub submitted: usize,
    pub delivered: usize,
    pub anomalous: usize,
    /// One entry per reading that was not delivered
    pub failures: Vec<DeliveryError>,
}

/// Totals over the scheduler's lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub submitted: u64,
    pub delivered: u64,
    pub failed: u64,
    pub anomalous: u64,
    pub drain: DrainOutcome,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            ticks: 0,
            submitted: 0,
            delivered: 0,
            failed: 0,
            anomalous: 0,
            drain: DrainOutcome::Clean,
        }
    }
}

impl RunSummary {
    fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.submitted += report.submitted as u64;
        self.delivered += report.delivered as u64;
        self.failed += report.failures.len() as u64;
        self.anomalous += report.anomalous as u64;
    }
}

/// Everything a tick touches
struct Pipeline<T: Transport, R> {
    topic: String,
    entities: EntitySet,
    generator: ReadingGenerator<R>,
    client: DeliveryClient<T>,
}

impl<T: Transport, R: Rng> Pipeline<T, R> {
    async fn run_tick(&mut self, tick: u64) -> TickReport {
        let mut report = TickReport {
            tick,
            submitted: 0,
            delivered: 0,
            anomalous: 0,
            failures: Vec::new(),
        };

        for entity in self.entities.iter() {
            let reading = self.generator.generate(entity);
            if self.generator.policy().classify(reading.value()) == Some(Band::Anomalous) {
                report.anomalous += 1;
            }

            debug!(
                tick = tick,
                entity_id = %reading.entity_id(),
                value = reading.value(),
                timestamp = reading.timestamp(),
                "Generated reading"
            );

            match self.client.publish(&self.topic, reading) {
                Ok(_) => report.submitted += 1,
                Err(e) => report.failures.push(e),
            }
        }

        match self.client.flush().await {
            Ok(()) => report.delivered = report.submitted,
            Err(e) => {
                report.delivered = e.attempted - e.failures.len();
                report.failures.extend(e.failures);
            }
        }

        report
    }
}

/// Drives the publish loop for a fixed entity set.
pub struct Scheduler<T: Transport, R = StdRng> {
    config: SchedulerConfig,
    pipeline: Pipeline<T, R>,
    state: watch::Sender<SchedulerState>,
    summary: RunSummary,
}

impl<T: Transport> Scheduler<T, StdRng> {
    /// Build a scheduler from validated producer configuration.
    ///
    /// Uses `config.seed` for the generator when set, OS entropy otherwise.
    pub fn from_config(config: &ProducerConfig, transport: T) -> Result<Self, ConfigError> {
        config.validate()?;

        let generator = match config.seed {
            Some(seed) => ReadingGenerator::seeded(config.generator.clone(), seed)?,
            None => ReadingGenerator::from_entropy(config.generator.clone())?,
        };
        let client = DeliveryClient::new(transport, config.delivery.retry_policy());

        Ok(Self::new(
            SchedulerConfig::from_config(config),
            config.entity_set()?,
            generator,
            client,
        ))
    }
}

impl<T: Transport, R: Rng> Scheduler<T, R> {
    pub fn new(
        config: SchedulerConfig,
        entities: EntitySet,
        generator: ReadingGenerator<R>,
        client: DeliveryClient<T>,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            pipeline: Pipeline {
                topic: config.topic.clone(),
                entities,
                generator,
                client,
            },
            config,
            state,
            summary: RunSummary::default(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Watch state transitions from another task
    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Run until cancelled (or until `max_ticks` ticks have completed), then
    /// drain and release the delivery client.
    pub async fn run(mut self, shutdown: CancellationToken) -> RunSummary {
        self.state.send_replace(SchedulerState::Running);
        info!(
            topic = %self.config.topic,
            entities = self.pipeline.entities.len(),
            interval_ms = self.config.tick_interval.as_millis() as u64,
            max_ticks = ?self.config.max_ticks,
            "Scheduler running"
        );

        let mut ticker = interval(self.config.tick_interval);
        // A slow tick pushes the schedule back instead of bursting to catch up
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut tick: u64 = 0;

        loop {
            if self.config.max_ticks.is_some_and(|max| tick >= max) {
                info!(ticks = tick, "Tick limit reached");
                break;
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Cancellation requested");
                    break;
                }
                _ = ticker.tick() => {}
            }

            tick += 1;
            let in_flight = self.pipeline.run_tick(tick);
            tokio::pin!(in_flight);

            let mut stop = false;
            let report = tokio::select! {
                biased;
                report = &mut in_flight => Some(report),
                _ = shutdown.cancelled() => {
                    stop = true;
                    self.state.send_replace(SchedulerState::Draining);
                    info!(tick = tick, "Cancellation requested, waiting for in-flight flush");

                    match timeout(self.config.drain_timeout, &mut in_flight).await {
                        Ok(report) => Some(report),
                        Err(_) => {
                            let err = ShutdownTimeout(self.config.drain_timeout);
                            warn!(tick = tick, error = %err, "Forcing stop");
                            self.summary.drain = DrainOutcome::TimedOut;
                            None
                        }
                    }
                }
            };

            if let Some(report) = report {
                log_report(&report);
                self.summary.record(&report);
            }

            if stop {
                break;
            }
        }

        self.state.send_replace(SchedulerState::Draining);
        self.stop().await
    }

    /// Release the delivery client, bounded by the drain timeout, then enter `Stopped`.
    async fn stop(mut self) -> RunSummary {
        match timeout(self.config.drain_timeout, self.pipeline.client.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to close delivery client cleanly"),
            Err(_) => {
                let err = ShutdownTimeout(self.config.drain_timeout);
                warn!(error = %err, "Broker connection not released, forcing stop");
                self.summary.drain = DrainOutcome::TimedOut;
            }
        }
        self.state.send_replace(SchedulerState::Stopped);

        info!(
            ticks = self.summary.ticks,
            submitted = self.summary.submitted,
            delivered = self.summary.delivered,
            failed = self.summary.failed,
            anomalous = self.summary.anomalous,
            drain = ?self.summary.drain,
            "Scheduler stopped"
        );

        self.summary
    }
}

fn log_report(report: &TickReport) {
    for failure in &report.failures {
        match failure {
            DeliveryError::Unretryable {
                reading,
                attempts,
                source,
            } => error!(
                tick = report.tick,
                entity_id = %reading.entity_id(),
                value = reading.value(),
                timestamp = reading.timestamp(),
                attempts = *attempts,
                error = %source,
                "Reading not delivered"
            ),
            other => error!(tick = report.tick, error = %other, "Reading rejected"),
        }
    }

    debug!(
        tick = report.tick,
        submitted = report.submitted,
        delivered = report.delivered,
        failed = report.failures.len(),
        "Tick complete"
    );
}
