//! File Store Module
//!
//! Durable variant of the memory store: loads state from a backing file on
//! open, snapshots it periodically from a background task, and replaces the
//! file atomically so readers never observe a partial write.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::store::{CacheEntry, MemoryStore, Store};

// == File Store ==
/// A [`MemoryStore`] with a backing file.
///
/// All read/mutate logic is forwarded to the wrapped memory store; this
/// type only adds load, snapshot and close behavior. Persistence failures
/// are logged and absorbed: callers see a store that is occasionally not
/// durable, never one that errors.
#[derive(Debug)]
pub struct FileStore {
    mem: MemoryStore,
    path: PathBuf,
    /// Periodic snapshot task, present when a write period is configured
    snapshot: Mutex<Option<JoinHandle<()>>>,
}

impl FileStore {
    // == Constructor ==
    /// Opens the store backed by `<dir>/<sanitized id>`, loading any state
    /// the file holds.
    ///
    /// When `write_period` is non-zero a background task snapshots the
    /// store at that cadence until [`FileStore::close`]; spawning it
    /// requires a running Tokio runtime.
    pub(crate) fn open(dir: &Path, id: &str, write_period: Option<Duration>) -> Arc<Self> {
        let store = Arc::new(Self {
            mem: MemoryStore::new(),
            path: dir.join(sanitize_filename(id)),
            snapshot: Mutex::new(None),
        });
        store.load();

        if let Some(period) = write_period.filter(|p| !p.is_zero()) {
            let handle = spawn_snapshot_task(Arc::clone(&store), period);
            *store.snapshot.lock().expect("snapshot handle lock poisoned") = Some(handle);
        }

        store
    }

    // == Settings Merge ==
    /// See [`MemoryStore::apply_put_settings`].
    pub(crate) fn apply_put_settings(
        &self,
        ttl: chrono::Duration,
        capacity: i64,
        effort: i64,
    ) {
        self.mem.apply_put_settings(ttl, capacity, effort);
    }

    // == Length ==
    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.mem.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }

    // == Backing Path ==
    /// The file this store persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // == Load ==
    /// Reads the backing file into memory.
    ///
    /// Records already expired at load time are discarded and mark the
    /// store dirty, since memory no longer reflects the file. A decode
    /// error ends the readable data but is not fatal. A file with nothing
    /// live left in it is deleted.
    fn load(&self) {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return,
            Err(err) => {
                error!(path = %self.path.display(), %err, "failed to open cache state");
                return;
            }
        };

        let now = Utc::now();
        let mut state = self.mem.state();
        let records = serde_json::Deserializer::from_reader(BufReader::new(file))
            .into_iter::<CacheEntry>();
        for record in records {
            match record {
                Ok(entry) if entry.is_expired(now) => {
                    // Memory now differs from the file
                    state.dirty = true;
                }
                Ok(entry) => state.insert_loaded(entry),
                Err(err) => {
                    // Tolerate trailing corruption: keep what decoded so far
                    warn!(path = %self.path.display(), %err, "failed to read cache state record");
                    break;
                }
            }
        }

        if state.is_empty() {
            debug!(path = %self.path.display(), "no live entries in cache state, removing file");
            if let Err(err) = std::fs::remove_file(&self.path) {
                if err.kind() != io::ErrorKind::NotFound {
                    error!(path = %self.path.display(), %err, "failed to remove stale cache state");
                }
            }
        }
    }

    // == Write Out ==
    /// Persists the live entries when the store is dirty.
    ///
    /// The new state is streamed to a temporary file in the destination
    /// directory and committed with a single rename, so an I/O failure at
    /// any step leaves the previous on-disk state intact. A final write-out
    /// of an empty cache deletes the backing file instead.
    pub(crate) fn write_state(&self, final_write: bool) {
        let mut state = self.mem.state();
        if !state.dirty {
            return;
        }

        if state.is_empty() && final_write {
            if let Err(err) = std::fs::remove_file(&self.path) {
                if err.kind() != io::ErrorKind::NotFound {
                    error!(path = %self.path.display(), %err, "failed to remove cache state");
                }
            }
            return;
        }

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = match NamedTempFile::new_in(dir) {
            Ok(tmp) => tmp,
            Err(err) => {
                error!(path = %self.path.display(), %err, "failed to create temporary cache state");
                return;
            }
        };
        if let Err(err) = restrict_permissions(tmp.as_file()) {
            error!(path = %self.path.display(), %err, "failed to set cache state permissions");
            return;
        }

        let now = Utc::now();
        let mut writer = BufWriter::new(tmp.as_file_mut());
        for entry in state.entries() {
            // Entries that expired since the last sweep are skipped, not
            // rewritten.
            if entry.is_expired(now) {
                continue;
            }
            if let Err(err) = append_record(&mut writer, entry) {
                error!(path = %self.path.display(), %err, "failed to write cache state record");
                return;
            }
        }
        if let Err(err) = writer.flush() {
            error!(path = %self.path.display(), %err, "failed to flush cache state");
            return;
        }
        drop(writer);

        if let Err(err) = tmp.as_file().sync_all() {
            error!(path = %self.path.display(), %err, "failed to sync cache state");
            return;
        }
        match tmp.persist(&self.path) {
            Ok(_) => state.dirty = false,
            Err(err) => {
                error!(path = %self.path.display(), %err, "failed to replace cache state")
            }
        }
    }

    // == Close ==
    /// Stops the periodic snapshot task and performs the final write-out.
    pub(crate) fn close(&self) {
        if let Some(handle) = self
            .snapshot
            .lock()
            .expect("snapshot handle lock poisoned")
            .take()
        {
            handle.abort();
        }
        self.write_state(true);
    }
}

// == Store Contract ==
impl Store for FileStore {
    fn put(&self, key: &str, value: Value) -> Result<()> {
        self.mem.put(key, value)
    }

    fn get(&self, key: &str) -> Result<Value> {
        self.mem.get(key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.mem.delete(key)
    }
}

// == Snapshot Task ==
/// Spawns the background task that periodically writes dirty state out.
///
/// The task only holds the store lock for the duration of a write, and an
/// abort can land only on the sleep, never inside a write.
fn spawn_snapshot_task(store: Arc<FileStore>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(path = %store.path.display(), ?period, "starting periodic cache writes");
        loop {
            tokio::time::sleep(period).await;
            store.write_state(false);
        }
    })
}

// == Record Encoding ==
/// Appends one JSON record and a newline.
fn append_record<W: Write>(writer: &mut W, entry: &CacheEntry) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, entry)?;
    writer.write_all(b"\n")
}

// == Permissions ==
#[cfg(unix)]
fn restrict_permissions(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File) -> io::Result<()> {
    Ok(())
}

// == Filename Sanitization ==
/// Maps a logical store ID to a safe filename, replacing path separators
/// and other characters that are illegal on common filesystems.
fn sanitize_filename(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
