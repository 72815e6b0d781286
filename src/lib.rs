//! Enrich Cache - a shared TTL cache for event enrichment pipelines
//!
//! Lets independent pipeline stages store and retrieve small key/value
//! facts without re-computing them for every event, with optional
//! file-backed persistence across process restarts.

pub mod config;
pub mod error;
pub mod event;
pub mod processor;
pub mod store;

pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use event::Event;
pub use processor::CacheProcessor;
pub use store::{Store, StoreHandle, StoreRegistry};
