//! Synthetic telemetry producer.
//!
//! Fabricates temperature readings for a fixed set of warehouses and
//! publishes them to a broker topic on a fixed cadence, with bounded retry
//! and graceful drain on shutdown.

// Configuration loading and validation
pub mod config;

// Reading model and entity set
pub mod reading;

// Synthetic reading generation
pub mod generator;

// Serialization, queueing and retrying publishes
pub mod delivery;

// Tick loop and shutdown state machine
pub mod scheduler;

// NATS broker transport
pub mod nats;

pub use config::{ConfigError, ProducerConfig};
pub use delivery::{DeliveryClient, DeliveryError, Transport, TransportError};
pub use generator::{GenerationPolicy, ReadingGenerator};
pub use reading::{Entity, EntitySet, Reading};
pub use scheduler::{DrainOutcome, RunSummary, Scheduler, SchedulerState};
