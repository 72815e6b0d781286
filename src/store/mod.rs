//! Store Module
//!
//! The cache engine: TTL-expiring stores with capacity-bounded eviction,
//! an optional file-backed durable variant, and the registry that shares
//! named instances across pipeline stages.

mod entry;
mod file;
mod heap;
mod memory;
mod registry;


// Re-export public types
pub use entry::CacheEntry;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use registry::{BackendKind, StoreHandle, StoreRegistry};

use serde_json::Value;

use crate::error::Result;

// == Store Contract ==
/// The operations a cache backend provides to processors.
///
/// Implementations are safe to share across threads; each call completes
/// under the store's own lock before the next begins. Absent or expired
/// keys surface as the no-data error from `get`; `delete` treats them as a
/// no-op.
pub trait Store: Send + Sync {
    /// Stores `value` under `key` with the store's configured TTL.
    fn put(&self, key: &str, value: Value) -> Result<()>;

    /// Returns the value under `key`, or the no-data error.
    fn get(&self, key: &str) -> Result<Value>;

    /// Removes `key` if present.
    fn delete(&self, key: &str) -> Result<()>;
}
