// NATS broker integration

mod client;
mod publisher;


pub use client::{BrokerConfig, NatsClient};
pub use publisher::NatsTransport;
