//! Error types for the enrichment cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for stores and processors.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key absent from the store, or found expired on lookup
    #[error("no data for key: {0}")]
    NoData(String),

    /// Event field exists but has the wrong type
    #[error("unexpected type for field '{field}': expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Get target field already holds a value and overwriting is disabled
    #[error("target field '{0}' already exists and overwrite_keys is false")]
    TargetCollision(String),

    /// Required event field is absent
    #[error("missing field: {0}")]
    MissingField(String),

    /// Configuration rejected at validation time
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    // == No Data Check ==
    /// Returns true for the "no data" condition, which callers may choose
    /// to treat as a pass-through rather than a failure.
    pub fn is_no_data(&self) -> bool {
        matches!(self, CacheError::NoData(_))
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
