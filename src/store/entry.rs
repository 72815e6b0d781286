//! Cache Entry Module
//!
//! Defines the record stored for each cached key, including the absolute
//! expiry time used for TTL tracking and on-disk persistence.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Cache Entry ==
/// A single stored record: key, opaque JSON value and absolute expiry.
///
/// Entries serialize to the persistence format directly, one JSON object
/// per record with an RFC 3339 `expires` timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cache key, unique within a store
    pub key: String,
    /// The stored value
    pub value: Value,
    /// Absolute expiry time; the entry is stale once this has passed
    pub expires: DateTime<Utc>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry expiring `ttl` after `now`.
    pub fn new(key: String, value: Value, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key,
            value,
            expires: now + ttl,
        }
    }

    // == Is Expired ==
    /// Checks whether the entry is stale at `now`.
    ///
    /// An entry expires strictly after its expiry instant, so a lookup at
    /// exactly `expires` still succeeds.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_expiry_boundary() {
        let now = Utc::now();
        let entry = CacheEntry::new("k".to_string(), json!(1), now, Duration::seconds(10));

        assert!(!entry.is_expired(now));
        // Exactly at the expiry instant the entry is still live
        assert!(!entry.is_expired(entry.expires));
        assert!(entry.is_expired(entry.expires + Duration::milliseconds(1)));
    }

    #[test]
    fn test_entry_negative_ttl_is_born_expired() {
        let now = Utc::now();
        let entry = CacheEntry::new("k".to_string(), json!(1), now, Duration::seconds(-1));

        assert!(entry.is_expired(now));
    }

    #[test]
    fn test_entry_round_trips_through_json() {
        let now = Utc::now();
        let entry = CacheEntry::new(
            "one".to_string(),
            json!({"nested": ["metadata", 2]}),
            now,
            Duration::hours(168),
        );

        let encoded = serde_json::to_string(&entry).unwrap();
        let decoded: CacheEntry = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.key, "one");
        assert_eq!(decoded.value, entry.value);
        assert_eq!(decoded.expires, entry.expires);
    }

    #[test]
    fn test_entry_decodes_rfc3339_expiry() {
        let raw = r#"{"key":"one","value":"metadata_value","expires":"2026-08-14T10:00:00Z"}"#;
        let decoded: CacheEntry = serde_json::from_str(raw).unwrap();

        assert_eq!(decoded.key, "one");
        assert_eq!(decoded.value, json!("metadata_value"));
        assert_eq!(decoded.expires.to_rfc3339(), "2026-08-14T10:00:00+00:00");
    }
}
