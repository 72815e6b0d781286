//! Store Registry Module
//!
//! Process-wide table of shared store instances. Pipeline stages that name
//! the same logical ID get the same store; reference counting keeps each
//! instance alive exactly as long as it has active referents, and durable
//! stores are flushed when the last referent lets go.

use std::collections::HashMap;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::store::{FileStore, MemoryStore, Store};

// == Backend Kind ==
/// Which table a store lives in. Memory and file stores are separate
/// namespaces; the same ID names unrelated stores in each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    File,
}

// == Store Registry ==
/// Registry of shared stores, cloned cheaply into every processor.
///
/// Built once at process start and passed to processor constructors; the
/// registry lock only guards the tables and reference counts, never an
/// individual store's data.
#[derive(Debug, Clone)]
pub struct StoreRegistry {
    shared: Arc<RegistryShared>,
}

#[derive(Debug)]
struct RegistryShared {
    /// Directory file-backed stores persist under
    cache_dir: PathBuf,
    stores: Mutex<Registries>,
}

#[derive(Debug, Default)]
struct Registries {
    memory: HashMap<String, Counted<MemoryStore>>,
    file: HashMap<String, Counted<FileStore>>,
}

#[derive(Debug)]
struct Counted<S> {
    store: Arc<S>,
    refs: usize,
}

impl StoreRegistry {
    // == Constructor ==
    /// Creates a registry whose file-backed stores live under `cache_dir`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                cache_dir: cache_dir.into(),
                stores: Mutex::new(Registries::default()),
            }),
        }
    }

    // == Acquire ==
    /// Resolves `config` to its shared store, creating it on first
    /// reference, and returns a handle that releases on drop.
    ///
    /// Put-derived settings (TTL, capacity, effort) merge into the store
    /// exactly once, from whichever referencing configuration supplies
    /// them first.
    pub fn acquire(&self, config: &CacheConfig) -> Result<StoreHandle> {
        config.validate()?;
        let put_settings = config
            .put
            .as_ref()
            .map(|put| (put.ttl, config.backend.capacity, config.backend.eviction_effort));

        let mut stores = self.lock_stores();
        if let Some(memory) = &config.backend.memory {
            let counted = stores.memory.entry(memory.id.clone()).or_insert_with(|| {
                debug!(id = %memory.id, "creating shared memory store");
                Counted {
                    store: Arc::new(MemoryStore::new()),
                    refs: 0,
                }
            });
            if let Some((ttl, capacity, effort)) = put_settings {
                counted.store.apply_put_settings(ttl, capacity, effort);
            }
            counted.refs += 1;
            Ok(self.handle(BackendKind::Memory, &memory.id, counted.store.clone()))
        } else if let Some(file) = &config.backend.file {
            let counted = stores.file.entry(file.id.clone()).or_insert_with(|| {
                debug!(id = %file.id, "creating shared file store");
                if let Err(err) = std::fs::create_dir_all(&self.shared.cache_dir) {
                    error!(
                        dir = %self.shared.cache_dir.display(),
                        %err,
                        "failed to create cache directory"
                    );
                }
                let write_period = file
                    .write_period
                    .and_then(|period| period.to_std().ok())
                    .filter(|period| !period.is_zero());
                Counted {
                    store: FileStore::open(&self.shared.cache_dir, &file.id, write_period),
                    refs: 0,
                }
            });
            if let Some((ttl, capacity, effort)) = put_settings {
                counted.store.apply_put_settings(ttl, capacity, effort);
            }
            counted.refs += 1;
            Ok(self.handle(BackendKind::File, &file.id, counted.store.clone()))
        } else {
            Err(CacheError::InvalidConfig(
                "no backend configured".to_string(),
            ))
        }
    }

    // == Release ==
    /// Drops one reference; at zero the store is closed and evicted.
    ///
    /// Panics on a release without a matching acquire, which is a
    /// lifecycle bug in the caller rather than a runtime condition.
    fn release(&self, kind: BackendKind, id: &str) {
        let mut stores = self.lock_stores();
        match kind {
            BackendKind::Memory => {
                let counted = stores
                    .memory
                    .get_mut(id)
                    .unwrap_or_else(|| panic!("release of unknown memory store '{id}'"));
                assert!(counted.refs > 0, "memory store '{id}' released more than acquired");
                counted.refs -= 1;
                if counted.refs == 0 {
                    debug!(id, "dropping shared memory store");
                    stores.memory.remove(id);
                }
            }
            BackendKind::File => {
                let counted = stores
                    .file
                    .get_mut(id)
                    .unwrap_or_else(|| panic!("release of unknown file store '{id}'"));
                assert!(counted.refs > 0, "file store '{id}' released more than acquired");
                counted.refs -= 1;
                if counted.refs == 0 {
                    debug!(id, "dropping shared file store");
                    let counted = stores.file.remove(id).expect("file store present");
                    counted.store.close();
                }
            }
        }
    }

    fn handle(&self, kind: BackendKind, id: &str, store: Arc<dyn Store>) -> StoreHandle {
        StoreHandle {
            registry: self.clone(),
            kind,
            id: id.to_string(),
            store,
        }
    }

    fn lock_stores(&self) -> std::sync::MutexGuard<'_, Registries> {
        self.shared.stores.lock().expect("store registry lock poisoned")
    }

    // == Test Introspection ==
    #[cfg(test)]
    fn contains(&self, kind: BackendKind, id: &str) -> bool {
        let stores = self.lock_stores();
        match kind {
            BackendKind::Memory => stores.memory.contains_key(id),
            BackendKind::File => stores.file.contains_key(id),
        }
    }

    #[cfg(test)]
    fn refs(&self, kind: BackendKind, id: &str) -> Option<usize> {
        let stores = self.lock_stores();
        match kind {
            BackendKind::Memory => stores.memory.get(id).map(|c| c.refs),
            BackendKind::File => stores.file.get(id).map(|c| c.refs),
        }
    }
}

// == Store Handle ==
/// A counted reference to a shared store.
///
/// Derefs to the `Store` contract; dropping the handle releases the
/// registry reference, which closes and flushes the store when it was the
/// last one.
pub struct StoreHandle {
    registry: StoreRegistry,
    kind: BackendKind,
    id: String,
    store: Arc<dyn Store>,
}

impl StoreHandle {
    /// The logical ID this handle references.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Deref for StoreHandle {
    type Target = dyn Store;

    fn deref(&self) -> &Self::Target {
        &*self.store
    }
}

impl Drop for StoreHandle {
    fn drop(&mut self) {
        self.registry.release(self.kind, &self.id);
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}
