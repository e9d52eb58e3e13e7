//! The internal store: one consolidated file, one in-memory map.
//!
//! The whole consolidated file is decoded once at open; after that, every
//! read is served synchronously from memory. Mutations update memory first
//! and then poke the debounced flush, which batch-encodes the full map off
//! the caller's context and atomically replaces the file. Disk is a lagging
//! mirror of memory, never the other way around.

use crate::error::{Fault, Faults, VaultError, VaultResult};
use crate::flush::{FlushFn, FlushScheduler};
use kvault_codec::{decode_batch, encode_batch, CodecResult, DecodedBatch, Entry, Header};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

type EntryMap = Arc<RwLock<BTreeMap<String, Entry>>>;

/// In-memory mapping of key name to entry, mirrored to one binary file.
pub struct InternalStore {
    path: PathBuf,
    entries: EntryMap,
    scheduler: FlushScheduler,
}

impl InternalStore {
    /// Open the store, decoding the consolidated file in one pass.
    ///
    /// An absent file is created empty. An undecodable file is reported as
    /// an initialization fault and the mapping resets to empty; startup
    /// degrades on corrupt data, it never fails.
    ///
    /// # Errors
    ///
    /// Returns an error only for unrecoverable conditions: the root
    /// directory cannot be created or the load task dies.
    pub(crate) async fn open(
        root: &Path,
        file_name: &str,
        debounce: Duration,
        faults: Faults,
    ) -> VaultResult<Self> {
        kvault_storage::ensure_dir(root)?;
        let path = root.join(file_name);

        let load_path = path.clone();
        let loaded = tokio::task::spawn_blocking(
            move || -> VaultResult<Option<CodecResult<DecodedBatch>>> {
                match kvault_storage::read_file(&load_path)? {
                    Some(bytes) => Ok(Some(decode_batch(&bytes))),
                    None => {
                        // First open: materialize the file so later reads see it
                        kvault_storage::atomic_write(&load_path, &[])?;
                        Ok(None)
                    }
                }
            },
        )
        .await
        .map_err(|e| VaultError::task(e.to_string()))??;

        let mut map = BTreeMap::new();
        match loaded {
            Some(Ok(batch)) => {
                if batch.skipped > 0 {
                    faults.report(
                        Fault::new(format!(
                            "skipped {} corrupt record(s) while loading {}",
                            batch.skipped,
                            path.display()
                        )),
                    );
                }
                map = batch.entries;
            }
            Some(Err(e)) => {
                faults.report(
                    Fault::new(format!(
                        "consolidated file {} is undecodable, starting empty",
                        path.display()
                    ))
                    .with_cause(&e),
                );
            }
            None => {}
        }
        debug!(entries = map.len(), path = %path.display(), "internal store loaded");

        let entries: EntryMap = Arc::new(RwLock::new(map));
        let scheduler = FlushScheduler::new(
            debounce,
            Self::flush_task(Arc::clone(&entries), path.clone(), faults),
        );

        Ok(Self {
            path,
            entries,
            scheduler,
        })
    }

    /// The debounced flush: snapshot the map, batch-encode off-context,
    /// replace the file atomically.
    fn flush_task(entries: EntryMap, path: PathBuf, faults: Faults) -> FlushFn {
        Arc::new(move || {
            let snapshot = entries.read().clone();
            let path = path.clone();
            let faults = faults.clone();
            Box::pin(async move {
                let count = snapshot.len();
                let target = path.clone();
                let result = tokio::task::spawn_blocking(move || -> VaultResult<()> {
                    let bytes = encode_batch(&snapshot)?;
                    kvault_storage::atomic_write(&target, &bytes)?;
                    Ok(())
                })
                .await;

                match result {
                    Ok(Ok(())) => {
                        debug!(entries = count, path = %path.display(), "internal store flushed");
                    }
                    Ok(Err(e)) => faults.report(
                        Fault::new(format!("flush of {} failed", path.display())).with_cause(&e),
                    ),
                    Err(e) => faults.report(
                        Fault::new(format!("flush task for {} died", path.display()))
                            .with_cause(&e),
                    ),
                }
            })
        })
    }

    /// Read an entry from memory. Synchronous, never touches disk.
    #[must_use]
    pub fn read(&self, name: &str) -> Option<Entry> {
        self.entries.read().get(name).cloned()
    }

    /// Whether an entry exists in memory.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Insert or replace an entry, then schedule a flush.
    pub fn write(&self, entry: Entry) {
        self.entries.write().insert(entry.name.clone(), entry);
        self.scheduler.poke();
    }

    /// Remove an entry. Returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        let removed = self.entries.write().remove(name).is_some();
        if removed {
            self.scheduler.poke();
        }
        removed
    }

    /// Remove all entries, returning the removed set.
    pub fn clear(&self) -> Vec<Entry> {
        let mut map = self.entries.write();
        let removed: Vec<Entry> = std::mem::take(&mut *map).into_values().collect();
        drop(map);
        if !removed.is_empty() {
            self.scheduler.poke();
        }
        removed
    }

    /// Remove every entry whose removable flag is set.
    ///
    /// This is a flags-only sweep: entry values are never inspected.
    pub fn clear_removable(&self) -> Vec<Entry> {
        let mut removed = Vec::new();
        {
            let mut map = self.entries.write();
            map.retain(|_, entry| {
                if entry.flags.is_removable() {
                    removed.push(entry.clone());
                    false
                } else {
                    true
                }
            });
        }
        if !removed.is_empty() {
            self.scheduler.poke();
        }
        removed
    }

    /// Snapshot of all entries.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<String, Entry> {
        self.entries.read().clone()
    }

    /// Header view of all entries, cheapest enumeration.
    #[must_use]
    pub fn headers(&self) -> Vec<Header> {
        self.entries.read().values().map(Entry::header).collect()
    }

    /// Number of entries in memory.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Path of the consolidated file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run the pending flush immediately. Used on graceful shutdown.
    pub async fn flush(&self) {
        self.scheduler.flush_now().await;
    }

    /// Number of completed flushes.
    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.scheduler.completed()
    }

    /// Wait until at least `n` flushes have completed.
    pub(crate) async fn wait_for_flushes(&self, n: u64) {
        self.scheduler.wait_for(n).await;
    }
}
