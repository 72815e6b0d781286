//! Configuration Module
//!
//! Defines the processor configuration consumed from the surrounding
//! pipeline's config layer, with fail-fast validation.

use chrono::Duration;
use serde::Deserialize;

use crate::error::{CacheError, Result};

// == Cache Config ==
/// Configuration for one cache processor instance.
///
/// Exactly one backend and exactly one operation must be set. Capacity,
/// eviction effort and TTL only take effect through a configuration that
/// carries a `put` section; get/delete-only configurations leave the
/// shared store's settings untouched.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Backend selector, shared by ID across processor instances
    pub backend: BackendConfig,
    /// Store a value from the event
    #[serde(default)]
    pub put: Option<PutConfig>,
    /// Look a value up and merge it into the event
    #[serde(default)]
    pub get: Option<GetConfig>,
    /// Remove a value
    #[serde(default)]
    pub delete: Option<DeleteConfig>,
    /// Pass events through silently when source fields (or cached data)
    /// are absent
    #[serde(default)]
    pub ignore_missing: bool,
    /// Allow a get to replace an existing target field
    #[serde(default)]
    pub overwrite_keys: bool,
}

// == Backend Config ==
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Purely in-memory store
    #[serde(default)]
    pub memory: Option<MemoryBackendConfig>,
    /// Memory store persisted to a local file
    #[serde(default)]
    pub file: Option<FileBackendConfig>,
    /// Maximum live entries; absent or <= 0 leaves the store unbounded
    #[serde(default = "unbounded")]
    pub capacity: i64,
    /// Maximum expired entries examined per eviction pass; absent or <= 0
    /// sweeps without bound
    #[serde(default = "unbounded")]
    pub eviction_effort: i64,
}

fn unbounded() -> i64 {
    -1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryBackendConfig {
    /// Logical store identity
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileBackendConfig {
    /// Logical store identity
    pub id: String,
    /// Snapshot cadence; absent or zero disables periodic writes (the
    /// final flush on close still happens)
    #[serde(default, deserialize_with = "duration::deserialize_opt")]
    pub write_period: Option<Duration>,
}

// == Operation Configs ==
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PutConfig {
    /// Event field holding the cache key; must be a string
    pub key_field: String,
    /// Event field holding the value to store
    pub value_field: String,
    /// Entry lifetime, fixed for the life of the store
    #[serde(deserialize_with = "duration::deserialize")]
    pub ttl: Duration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetConfig {
    /// Event field holding the cache key; must be a string
    pub key_field: String,
    /// Event field the cached value is written to
    pub target_field: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeleteConfig {
    /// Event field holding the cache key; must be a string
    pub key_field: String,
}

impl CacheConfig {
    // == Validation ==
    /// Rejects invalid configurations before any store is created.
    ///
    /// A put TTL is enforced structurally: `put.ttl` is a required field
    /// and deserialization fails without it.
    pub fn validate(&self) -> Result<()> {
        match (&self.backend.memory, &self.backend.file) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(CacheError::InvalidConfig(
                    "exactly one of backend.memory and backend.file must be set".to_string(),
                ));
            }
            (Some(mem), None) if mem.id.is_empty() => {
                return Err(CacheError::InvalidConfig(
                    "backend.memory.id must not be empty".to_string(),
                ));
            }
            (None, Some(file)) if file.id.is_empty() => {
                return Err(CacheError::InvalidConfig(
                    "backend.file.id must not be empty".to_string(),
                ));
            }
            _ => {}
        }

        let operations =
            self.put.is_some() as usize + self.get.is_some() as usize + self.delete.is_some() as usize;
        if operations != 1 {
            return Err(CacheError::InvalidConfig(
                "exactly one of put, get and delete must be configured".to_string(),
            ));
        }

        for (name, field) in self.named_fields() {
            if field.is_empty() {
                return Err(CacheError::InvalidConfig(format!(
                    "{name} must not be empty"
                )));
            }
        }
        Ok(())
    }

    // == Store Identity ==
    /// The logical store ID, whichever backend carries it.
    pub fn store_id(&self) -> &str {
        match (&self.backend.memory, &self.backend.file) {
            (Some(mem), _) => &mem.id,
            (_, Some(file)) => &file.id,
            (None, None) => "",
        }
    }

    fn named_fields(&self) -> Vec<(&'static str, &str)> {
        let mut fields = Vec::new();
        if let Some(put) = &self.put {
            fields.push(("put.key_field", put.key_field.as_str()));
            fields.push(("put.value_field", put.value_field.as_str()));
        }
        if let Some(get) = &self.get {
            fields.push(("get.key_field", get.key_field.as_str()));
            fields.push(("get.target_field", get.target_field.as_str()));
        }
        if let Some(delete) = &self.delete {
            fields.push(("delete.key_field", delete.key_field.as_str()));
        }
        fields
    }
}

// == Duration Fields ==
/// Serde support for duration fields that accept `"168h"`-style strings
/// (integer count plus `ms`/`s`/`m`/`h`/`d`/`w` unit) or bare integers
/// meaning seconds.
pub(crate) mod duration {
    use chrono::Duration;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(i64),
        Text(String),
    }

    impl Raw {
        fn into_duration<E: Error>(self) -> Result<Duration, E> {
            match self {
                Raw::Seconds(secs) => Ok(Duration::seconds(secs)),
                Raw::Text(text) => parse_duration(&text).map_err(E::custom),
            }
        }
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Raw::deserialize(deserializer)?.into_duration()
    }

    pub(crate) fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            Some(raw) => raw.into_duration().map(Some),
            None => Ok(None),
        }
    }

    /// Parses a unit-suffixed duration string.
    pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty duration".to_string());
        }

        let unit_at = s
            .find(|c: char| !c.is_ascii_digit() && c != '-')
            .unwrap_or(s.len());
        let (count, unit) = s.split_at(unit_at);
        let count: i64 = count
            .parse()
            .map_err(|_| format!("invalid duration: '{s}'"))?;

        match unit {
            "" | "s" => Ok(Duration::seconds(count)),
            "ms" => Ok(Duration::milliseconds(count)),
            "m" => Ok(Duration::minutes(count)),
            "h" => Ok(Duration::hours(count)),
            "d" => Ok(Duration::days(count)),
            "w" => Ok(Duration::weeks(count)),
            _ => Err(format!("invalid duration unit: '{unit}'")),
        }
    }
}
