use crate::config::ConfigError;
use anyhow::{Context, Result};
use async_nats::jetstream::{self, stream};
use async_nats::{ConnectOptions, ServerAddr};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

/// Broker configuration
#[derive(Clone, Debug, Deserialize)]
pub struct BrokerConfig {
    /// One or more NATS server addresses (list or comma-separated string)
    #[serde(default, deserialize_with = "deserialize_address")]
    pub address: Vec<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// Await JetStream acks (at-least-once). Core NATS publish otherwise.
    #[serde(default = "default_jetstream")]
    pub jetstream: bool,
    #[serde(default = "default_stream_name")]
    pub stream_name: String,
}

fn default_topic() -> String {
    "sensor-suhu-gudang".to_string()
}

fn default_client_name() -> String {
    "telemetry-producer".to_string()
}

fn default_connection_timeout_ms() -> u64 {
    5000
}

fn default_jetstream() -> bool {
    true
}

fn default_stream_name() -> String {
    "SENSOR_TELEMETRY".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: Vec::new(),
            topic: default_topic(),
            client_name: default_client_name(),
            connection_timeout_ms: default_connection_timeout_ms(),
            jetstream: default_jetstream(),
            stream_name: default_stream_name(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AddressList {
    One(String),
    Many(Vec<String>),
}

fn deserialize_address<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let list = match AddressList::deserialize(deserializer)? {
        AddressList::One(s) => s.split(',').map(|a| a.trim().to_string()).collect(),
        AddressList::Many(v) => v,
    };
    Ok(list.into_iter().filter(|a| !a.is_empty()).collect())
}

impl BrokerConfig {
    /// Parse the configured addresses; fails if none is set or any is malformed.
    pub fn server_addrs(&self) -> std::result::Result<Vec<ServerAddr>, ConfigError> {
        if self.address.is_empty() {
            return Err(ConfigError::MissingBrokerAddress);
        }
        self.address
            .iter()
            .map(|address| {
                address
                    .parse::<ServerAddr>()
                    .map_err(|e| ConfigError::InvalidBrokerAddress {
                        address: address.clone(),
                        reason: e.to_string(),
                    })
            })
            .collect()
    }
}

/// NATS connection, with the JetStream context when enabled
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: Option<jetstream::Context>,
    config: BrokerConfig,
}

impl NatsClient {
    /// Connect to NATS and, in JetStream mode, make sure the stream exists
    pub async fn connect(config: BrokerConfig) -> Result<Self> {
        let addrs = config.server_addrs()?;
        info!(address = ?config.address, client_name = %config.client_name, "Connecting to NATS");

        let client = ConnectOptions::new()
            .name(config.client_name.clone())
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .connect(addrs.as_slice())
            .await
            .context("Failed to connect to NATS")?;

        let jetstream = config.jetstream.then(|| jetstream::new(client.clone()));

        let nats_client = Self {
            client,
            jetstream,
            config,
        };

        if let Some(js) = &nats_client.jetstream {
            nats_client.ensure_stream(js).await?;
        }

        Ok(nats_client)
    }

    /// Ensure JetStream stream exists and captures the topic
    async fn ensure_stream(&self, js: &jetstream::Context) -> Result<()> {
        info!("Ensuring JetStream stream '{}' exists", self.config.stream_name);

        if let Ok(mut existing) = js.get_stream(&self.config.stream_name).await {
            let info = existing
                .info()
                .await
                .context("Failed to read JetStream stream info")?;

            if let Some(updated) = with_topic(info.config.clone(), &self.config.topic) {
                info!(
                    subjects = ?updated.subjects,
                    "Stream '{}' does not capture '{}', adding it",
                    self.config.stream_name,
                    self.config.topic
                );
                js.update_stream(updated)
                    .await
                    .context("Failed to add topic to JetStream stream")?;
            } else {
                info!("Stream '{}' already exists", self.config.stream_name);
            }
            return Ok(());
        }

        info!("Stream '{}' does not exist, creating...", self.config.stream_name);

        let stream_config = stream::Config {
            name: self.config.stream_name.clone(),
            subjects: vec![self.config.topic.clone()],
            storage: stream::StorageType::File,
            retention: stream::RetentionPolicy::Limits,
            ..Default::default()
        };

        js.create_stream(stream_config)
            .await
            .context("Failed to create JetStream stream")?;

        info!("Created JetStream stream '{}'", self.config.stream_name);
        Ok(())
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    pub fn jetstream(&self) -> Option<&jetstream::Context> {
        self.jetstream.as_ref()
    }
}

/// Stream config extended with `topic`, or `None` if a subject already captures it
pub(crate) fn with_topic(mut config: stream::Config, topic: &str) -> Option<stream::Config> {
    if config.subjects.iter().any(|s| subject_matches(s, topic)) {
        return None;
    }
    config.subjects.push(topic.to_string());
    Some(config)
}

/// NATS subject match: `*` covers one token, a trailing `>` one or more
pub(crate) fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut tokens = subject.split('.');
    for expected in pattern.split('.') {
        match (expected, tokens.next()) {
            (">", Some(_)) => return true,
            ("*", Some(_)) => {}
            (expected, Some(actual)) if expected == actual => {}
            _ => return false,
        }
    }
    tokens.next().is_none()
}
