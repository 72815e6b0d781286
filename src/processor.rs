//! Cache Processor Module
//!
//! The event-facing side of the cache: each processor instance performs one
//! configured operation (put, get or delete) against a shared store for
//! every event it is handed.

use serde_json::Value;

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::event::{json_type_name, Event};
use crate::store::{StoreHandle, StoreRegistry};

// == Cache Processor ==
/// One pipeline stage backed by a shared store.
///
/// Errors never leave the event half-modified: every check runs before the
/// single mutation a successful get performs. A failed get for absent or
/// expired data surfaces as the distinguished no-data error
/// ([`CacheError::is_no_data`]) unless `ignore_missing` turns it into a
/// pass-through; dropping the processor releases its store reference.
#[derive(Debug)]
pub struct CacheProcessor {
    op: CacheOp,
    store: StoreHandle,
    ignore_missing: bool,
    overwrite_keys: bool,
}

// == Configured Operation ==
#[derive(Debug)]
enum CacheOp {
    Put {
        key_field: String,
        value_field: String,
    },
    Get {
        key_field: String,
        target_field: String,
    },
    Delete {
        key_field: String,
    },
}

impl CacheProcessor {
    // == Constructor ==
    /// Validates `config` and acquires the referenced shared store.
    pub fn new(registry: &StoreRegistry, config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let store = registry.acquire(&config)?;

        let op = if let Some(put) = config.put {
            CacheOp::Put {
                key_field: put.key_field,
                value_field: put.value_field,
            }
        } else if let Some(get) = config.get {
            CacheOp::Get {
                key_field: get.key_field,
                target_field: get.target_field,
            }
        } else if let Some(delete) = config.delete {
            CacheOp::Delete {
                key_field: delete.key_field,
            }
        } else {
            // validate() guarantees exactly one operation
            return Err(CacheError::InvalidConfig(
                "no operation configured".to_string(),
            ));
        };

        Ok(Self {
            op,
            store,
            ignore_missing: config.ignore_missing,
            overwrite_keys: config.overwrite_keys,
        })
    }

    // == Process ==
    /// Applies the configured operation to `event`.
    pub fn process(&self, event: &mut Event) -> Result<()> {
        match &self.op {
            CacheOp::Put {
                key_field,
                value_field,
            } => self.put(event, key_field, value_field),
            CacheOp::Get {
                key_field,
                target_field,
            } => self.get(event, key_field, target_field),
            CacheOp::Delete { key_field } => self.delete(event, key_field),
        }
    }

    // == Put ==
    fn put(&self, event: &Event, key_field: &str, value_field: &str) -> Result<()> {
        let key = match self.string_key(event, key_field)? {
            Some(key) => key,
            None => return Ok(()),
        };
        let value = match event.get(value_field) {
            Some(value) => value.clone(),
            None if self.ignore_missing => return Ok(()),
            None => return Err(CacheError::MissingField(value_field.to_string())),
        };
        self.store.put(key, value)
    }

    // == Get ==
    fn get(&self, event: &mut Event, key_field: &str, target_field: &str) -> Result<()> {
        let key = match self.string_key(event, key_field)? {
            Some(key) => key,
            None => return Ok(()),
        };
        let value = match self.store.get(key) {
            Ok(value) => value,
            Err(err) if err.is_no_data() && self.ignore_missing => return Ok(()),
            Err(err) => return Err(err),
        };

        if event.get(target_field).is_some() && !self.overwrite_keys {
            return Err(CacheError::TargetCollision(target_field.to_string()));
        }
        event.put(target_field, value)?;
        Ok(())
    }

    // == Delete ==
    fn delete(&self, event: &Event, key_field: &str) -> Result<()> {
        let key = match self.string_key(event, key_field)? {
            Some(key) => key,
            None => return Ok(()),
        };
        self.store.delete(key)
    }

    // == Key Extraction ==
    /// Reads the cache key from the event.
    ///
    /// A missing field is `Ok(None)` under `ignore_missing` and an error
    /// otherwise; a present non-string field is always an error, since it
    /// usually indicates a configuration mistake.
    fn string_key<'a>(&self, event: &'a Event, key_field: &str) -> Result<Option<&'a str>> {
        match event.get(key_field) {
            Some(Value::String(key)) => Ok(Some(key)),
            Some(other) => Err(CacheError::TypeMismatch {
                field: key_field.to_string(),
                expected: "string",
                found: json_type_name(other),
            }),
            None if self.ignore_missing => Ok(None),
            None => Err(CacheError::MissingField(key_field.to_string())),
        }
    }
}
