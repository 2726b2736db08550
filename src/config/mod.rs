use serde::Deserialize;
use std::path::Path;
use std::time::Duration;


// Re-export component config types
pub use crate::delivery::DeliveryConfig;
pub use crate::generator::GenerationPolicy;
pub use crate::nats::BrokerConfig;
use crate::reading::EntitySet;

/// Environment variable holding the optional TOML config path
pub const CONFIG_PATH_ENV: &str = "PRODUCER_CONFIG";

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("broker address is required (set broker.address or BROKER_ADDRESS)")]
    MissingBrokerAddress,
    #[error("invalid broker address '{address}': {reason}")]
    InvalidBrokerAddress { address: String, reason: String },
    #[error("topic must not be empty")]
    EmptyTopic,
    #[error("at least one entity is required")]
    NoEntities,
    #[error("entity identifiers must not be blank")]
    BlankEntity,
    #[error("duplicate entity '{0}'")]
    DuplicateEntity(String),
    #[error("tick interval must be a positive duration")]
    ZeroTickInterval,
    #[error("{name} is invalid: min {min} > max {max}")]
    InvalidRange { name: &'static str, min: i64, max: i64 },
    #[error("normal_range and anomalous_range must not overlap")]
    OverlappingRanges,
    #[error("anomalous_probability must be within [0, 1], got {0}")]
    InvalidProbability(f64),
    #[error("max_retries must be at least 1")]
    ZeroRetries,
    #[error("invalid backoff settings: {0}")]
    InvalidBackoff(String),
    #[error("environment variable {key} has invalid value '{value}'")]
    InvalidEnv { key: &'static str, value: String },
    #[error("failed to read config file '{path}': {reason}")]
    Read { path: String, reason: String },
    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Complete producer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProducerConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Ordered entity identifiers to monitor
    #[serde(default = "default_entities")]
    pub entities: Vec<String>,
    /// Publish cadence (milliseconds)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Stop after this many ticks (runs until cancelled when unset)
    #[serde(default)]
    pub max_ticks: Option<u64>,
    /// Seed for the reading generator (OS entropy when unset)
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub generator: GenerationPolicy,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Upper bound on waiting for in-flight work during shutdown (milliseconds)
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

fn default_entities() -> Vec<String> {
    vec!["G1".to_string(), "G2".to_string(), "G3".to_string()]
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_drain_timeout_ms() -> u64 {
    5000
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            entities: default_entities(),
            tick_interval_ms: default_tick_interval_ms(),
            max_ticks: None,
            seed: None,
            generator: GenerationPolicy::default(),
            delivery: DeliveryConfig::default(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl ProducerConfig {
    /// Load configuration: optional TOML file, then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => load_config(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BROKER_ADDRESS") {
            self.broker.address = split_list(&v);
        }
        if let Some(v) = lookup("PRODUCER_TOPIC") {
            self.broker.topic = v;
        }
        if let Some(v) = lookup("PRODUCER_ENTITIES") {
            self.entities = split_list(&v);
        }
        if let Some(v) = lookup("PRODUCER_TICK_INTERVAL_MS") {
            self.tick_interval_ms = parse_env("PRODUCER_TICK_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("PRODUCER_MAX_TICKS") {
            self.max_ticks = Some(parse_env("PRODUCER_MAX_TICKS", &v)?);
        }
        if let Some(v) = lookup("PRODUCER_SEED") {
            self.seed = Some(parse_env("PRODUCER_SEED", &v)?);
        }
        if let Some(v) = lookup("PRODUCER_MAX_RETRIES") {
            self.delivery.max_retries = parse_env("PRODUCER_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("PRODUCER_DRAIN_TIMEOUT_MS") {
            self.drain_timeout_ms = parse_env("PRODUCER_DRAIN_TIMEOUT_MS", &v)?;
        }
        Ok(())
    }

    /// Check every section; the first problem found is returned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker.server_addrs()?;
        if self.broker.topic.trim().is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        self.entity_set()?;
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroTickInterval);
        }
        self.generator.validate()?;
        self.delivery.validate()?;
        Ok(())
    }

    pub fn entity_set(&self) -> Result<EntitySet, ConfigError> {
        EntitySet::new(self.entities.iter().cloned())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &Path) -> Result<ProducerConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key,
        value: value.to_string(),
    })
}
