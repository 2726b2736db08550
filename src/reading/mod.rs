use crate::config::ConfigError;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

#[cfg(test)]
mod tests;

/// A monitored unit (e.g. a warehouse).
///
/// Entities are only handed out by an [`EntitySet`], so every reading the
/// generator produces refers to a configured entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entity {
    id: String,
}

impl Entity {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Fixed, ordered set of monitored entities.
///
/// Iteration order is insertion order and never changes for the lifetime
/// of the set.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySet {
    entities: Vec<Entity>,
}

impl EntitySet {
    /// Build a set from identifiers, rejecting empty input, blank ids and duplicates.
    pub fn new<I, S>(ids: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut entities = Vec::new();

        for id in ids {
            let id: String = id.into();
            let id = id.trim().to_string();
            if id.is_empty() {
                return Err(ConfigError::BlankEntity);
            }
            if !seen.insert(id.clone()) {
                return Err(ConfigError::DuplicateEntity(id));
            }
            entities.push(Entity { id });
        }

        if entities.is_empty() {
            return Err(ConfigError::NoEntities);
        }

        Ok(Self { entities })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entities.iter().any(|e| e.id == id)
    }
}

/// One measurement event.
///
/// Wire format is a JSON object with the stable field names `entity_id`,
/// `value` and `timestamp` (Unix epoch seconds). Readings are only built by
/// the generator, so decoding is limited to this crate's tests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct Reading {
    entity_id: String,
    value: i64,
    timestamp: i64,
}

impl Reading {
    pub(crate) fn new(entity: &Entity, value: i64, timestamp: i64) -> Self {
        Self {
            entity_id: entity.id.clone(),
            value,
            timestamp,
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{entity_id: {}, value: {}, timestamp: {}}}",
            self.entity_id, self.value, self.timestamp
        )
    }
}
