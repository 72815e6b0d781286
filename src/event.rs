//! Event Module
//!
//! The processor-facing view of a pipeline event: a JSON object with
//! dotted-path field access (`crowdstrike.aid` names `aid` inside the
//! `crowdstrike` object).

use serde_json::{Map, Value};

use crate::error::{CacheError, Result};

// == Event ==
/// A structured event flowing through an enrichment pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    fields: Map<String, Value>,
}

impl Event {
    // == Constructor ==
    /// Creates an empty event.
    pub fn new() -> Self {
        Self::default()
    }

    // == Field Access ==
    /// Returns the value at `path`, or `None` when any segment is absent
    /// or an intermediate segment is not an object.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.fields.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    // == Field Insert ==
    /// Places `value` at `path`, creating intermediate objects as needed,
    /// and returns the previous value if one was replaced.
    ///
    /// Fails without modifying the event when an existing intermediate
    /// segment holds a non-object: an error can only arise on the
    /// pre-existing part of the path, before anything is created.
    pub fn put(&mut self, path: &str, value: Value) -> Result<Option<Value>> {
        let mut segments: Vec<&str> = path.split('.').collect();
        let leaf = segments.pop().unwrap_or(path);

        let mut current = &mut self.fields;
        for segment in segments {
            let slot = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = match slot {
                Value::Object(map) => map,
                other => {
                    return Err(CacheError::TypeMismatch {
                        field: segment.to_string(),
                        expected: "object",
                        found: json_type_name(other),
                    })
                }
            };
        }
        Ok(current.insert(leaf.to_string(), value))
    }

    // == Field Removal ==
    /// Detaches and returns the value at `path`; absent paths are `None`.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let mut segments: Vec<&str> = path.split('.').collect();
        let leaf = segments.pop()?;

        let mut current = &mut self.fields;
        for segment in segments {
            current = current.get_mut(segment)?.as_object_mut()?;
        }
        current.remove(leaf)
    }

    // == Raw Fields ==
    /// Borrows the underlying field map.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Consumes the event, returning the field map.
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

impl From<Map<String, Value>> for Event {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl TryFrom<Value> for Event {
    type Error = CacheError;

    /// Accepts a JSON object; any other value is a type mismatch.
    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(CacheError::TypeMismatch {
                field: String::new(),
                expected: "object",
                found: json_type_name(&other),
            }),
        }
    }
}

// == JSON Type Names ==
/// Human-readable name of a JSON value's type, for error messages.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
