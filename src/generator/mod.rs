use crate::config::ConfigError;
use crate::reading::{Entity, Reading};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::collections::HashMap;


/// Which range a value was drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Normal,
    Anomalous,
}

/// Reading generation policy.
///
/// With probability `anomalous_probability` a value is drawn uniformly from
/// `anomalous_range`, otherwise from `normal_range`. Both ranges are inclusive.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerationPolicy {
    #[serde(default = "default_normal_range")]
    pub normal_range: (i64, i64),
    #[serde(default = "default_anomalous_range")]
    pub anomalous_range: (i64, i64),
    #[serde(default = "default_anomalous_probability")]
    pub anomalous_probability: f64,
}

fn default_normal_range() -> (i64, i64) {
    (15, 25)
}

fn default_anomalous_range() -> (i64, i64) {
    (80, 90)
}

fn default_anomalous_probability() -> f64 {
    0.3
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            normal_range: default_normal_range(),
            anomalous_range: default_anomalous_range(),
            anomalous_probability: default_anomalous_probability(),
        }
    }
}

impl GenerationPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (nmin, nmax) = self.normal_range;
        if nmin > nmax {
            return Err(ConfigError::InvalidRange {
                name: "normal_range",
                min: nmin,
                max: nmax,
            });
        }
        let (amin, amax) = self.anomalous_range;
        if amin > amax {
            return Err(ConfigError::InvalidRange {
                name: "anomalous_range",
                min: amin,
                max: amax,
            });
        }
        if nmin <= amax && amin <= nmax {
            return Err(ConfigError::OverlappingRanges);
        }
        let p = self.anomalous_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::InvalidProbability(p));
        }
        Ok(())
    }

    /// Band a value belongs to, or `None` if it lies outside both ranges.
    pub fn classify(&self, value: i64) -> Option<Band> {
        if (self.normal_range.0..=self.normal_range.1).contains(&value) {
            Some(Band::Normal)
        } else if (self.anomalous_range.0..=self.anomalous_range.1).contains(&value) {
            Some(Band::Anomalous)
        } else {
            None
        }
    }
}

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

/// Produces one synthetic reading per (entity, tick).
///
/// Output is deterministic for a seeded random source and a fixed clock.
/// Timestamps never go backwards per entity: if the clock steps back, the
/// entity's previous timestamp is reused.
pub struct ReadingGenerator<R = StdRng> {
    policy: GenerationPolicy,
    rng: R,
    clock: Clock,
    last_timestamps: HashMap<String, i64>,
}

impl ReadingGenerator<StdRng> {
    /// Deterministic generator for a given seed
    pub fn seeded(policy: GenerationPolicy, seed: u64) -> Result<Self, ConfigError> {
        Self::with_rng(policy, StdRng::seed_from_u64(seed))
    }

    /// Generator seeded from OS entropy
    pub fn from_entropy(policy: GenerationPolicy) -> Result<Self, ConfigError> {
        Self::with_rng(policy, StdRng::from_entropy())
    }
}

impl<R: Rng> ReadingGenerator<R> {
    /// Rejects a policy that `GenerationPolicy::validate` would reject.
    pub fn with_rng(policy: GenerationPolicy, rng: R) -> Result<Self, ConfigError> {
        policy.validate()?;
        Ok(Self {
            policy,
            rng,
            clock: Box::new(|| Utc::now().timestamp()),
            last_timestamps: HashMap::new(),
        })
    }

    /// Replace the wall clock (epoch seconds)
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    pub fn policy(&self) -> &GenerationPolicy {
        &self.policy
    }

    pub fn generate(&mut self, entity: &Entity) -> Reading {
        let value = self.draw_value();

        let now = (self.clock)();
        let timestamp = match self.last_timestamps.get(entity.id()) {
            Some(&last) if last > now => last,
            _ => now,
        };
        self.last_timestamps.insert(entity.id().to_string(), timestamp);

        Reading::new(entity, value, timestamp)
    }

    fn draw_value(&mut self) -> i64 {
        let (min, max) = if self.rng.gen_bool(self.policy.anomalous_probability) {
            self.policy.anomalous_range
        } else {
            self.policy.normal_range
        };
        self.rng.gen_range(min..=max)
    }
}
