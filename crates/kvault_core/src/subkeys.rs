//! The sub-key index: persisted sets of dynamically generated child names.
//!
//! A parent key with an unbounded child set registers each child suffix
//! here. Names buffer in memory and merge with disk on the debounce timer.
//! The merge is union-only: a child disappears only through an explicit
//! `remove` or `clear`, never because a merge happened to run. Redundant
//! writes are skipped when the union already matches disk.

use crate::error::{Fault, Faults, VaultError, VaultResult};
use crate::flush::{FlushFn, FlushScheduler};
use kvault_codec::{decode_entry, encode_entry, hash36, Flags, Value};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Suffix appended to a parent name to derive its sub-key file identity.
pub const SUBKEY_SUFFIX: &str = "$sk";

#[derive(Default)]
struct ParentSet {
    names: HashSet<String>,
    /// Tombstones: explicitly removed names, subtracted at the next merge.
    removed: HashSet<String>,
}

type Sets = Arc<RwLock<HashMap<String, ParentSet>>>;

/// Per-parent persisted sets of child key names.
pub struct SubKeyIndex {
    root: PathBuf,
    sets: Sets,
    dirty: Arc<Mutex<HashSet<String>>>,
    scheduler: FlushScheduler,
    faults: Faults,
}

fn file_path(root: &Path, parent: &str) -> PathBuf {
    root.join(hash36(&format!("{parent}{SUBKEY_SUFFIX}")))
}

/// Decode a persisted sub-key set. Absent, empty, or undecodable files all
/// read as the empty set; an undecodable file will simply be rewritten by
/// the next merge.
fn load_set(path: &Path) -> VaultResult<HashSet<String>> {
    let Some(bytes) = kvault_storage::read_file(path)? else {
        return Ok(HashSet::new());
    };
    let Some(entry) = decode_entry(&bytes) else {
        return Ok(HashSet::new());
    };
    let Some(items) = entry.value.as_list() else {
        return Ok(HashSet::new());
    };
    Ok(items
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect())
}

/// Compute the union merge and whether disk needs rewriting.
fn merge_union(
    disk: &HashSet<String>,
    memory: &HashSet<String>,
    removed: &HashSet<String>,
) -> (HashSet<String>, bool) {
    let union: HashSet<String> = disk
        .union(memory)
        .filter(|name| !removed.contains(*name))
        .cloned()
        .collect();
    let changed = union != *disk;
    (union, changed)
}

fn set_value(names: &HashSet<String>) -> Value {
    let mut sorted: Vec<&String> = names.iter().collect();
    sorted.sort();
    Value::List(sorted.into_iter().map(|n| Value::Str(n.clone())).collect())
}

impl SubKeyIndex {
    pub(crate) fn new(
        root: &Path,
        store_name: &str,
        debounce: Duration,
        faults: Faults,
    ) -> Self {
        let sets: Sets = Arc::new(RwLock::new(HashMap::new()));
        let dirty: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        let scheduler = FlushScheduler::new(
            debounce,
            Self::flush_task(
                Arc::clone(&sets),
                Arc::clone(&dirty),
                root.to_path_buf(),
                store_name.to_string(),
                faults.clone(),
            ),
        );
        Self {
            root: root.to_path_buf(),
            sets,
            dirty,
            scheduler,
            faults,
        }
    }

    fn flush_task(
        sets: Sets,
        dirty: Arc<Mutex<HashSet<String>>>,
        root: PathBuf,
        store_name: String,
        faults: Faults,
    ) -> FlushFn {
        Arc::new(move || {
            let sets = Arc::clone(&sets);
            let dirty = Arc::clone(&dirty);
            let root = root.clone();
            let store_name = store_name.clone();
            let faults = faults.clone();
            Box::pin(async move {
                let parents: Vec<String> = dirty.lock().drain().collect();
                for parent in parents {
                    let (names, removed) = match sets.read().get(&parent) {
                        Some(set) => (set.names.clone(), set.removed.clone()),
                        None => continue,
                    };
                    let removed_snapshot = removed.clone();
                    let path = file_path(&root, &parent);
                    let store = store_name.clone();
                    let entry_name = format!("{parent}{SUBKEY_SUFFIX}");

                    let merged = tokio::task::spawn_blocking(
                        move || -> VaultResult<HashSet<String>> {
                            let disk = load_set(&path)?;
                            let (union, changed) = merge_union(&disk, &names, &removed);
                            if changed {
                                let bytes = encode_entry(
                                    &store,
                                    &entry_name,
                                    &set_value(&union),
                                    Flags::NONE,
                                )?;
                                kvault_storage::atomic_write(&path, &bytes)?;
                            }
                            Ok(union)
                        },
                    )
                    .await
                    .map_err(|e| VaultError::task(e.to_string()))
                    .and_then(|r| r);

                    match merged {
                        Ok(union) => {
                            debug!(parent = %parent, children = union.len(), "sub-key set merged");
                            let mut sets = sets.write();
                            if let Some(set) = sets.get_mut(&parent) {
                                set.names.extend(union);
                                set.removed.retain(|r| !removed_snapshot.contains(r));
                            }
                        }
                        Err(e) => faults.report(
                            Fault::new("sub-key merge failed")
                                .with_key(parent.as_str())
                                .with_cause(&e),
                        ),
                    }
                }
            })
        })
    }

    /// Load the persisted set for a parent on first access, merging it into
    /// whatever has already been registered in memory.
    async fn ensure_loaded(&self, parent: &str) -> VaultResult<()> {
        if self.sets.read().contains_key(parent) {
            return Ok(());
        }
        let path = file_path(&self.root, parent);
        let loaded = tokio::task::spawn_blocking(move || load_set(&path))
            .await
            .map_err(|e| VaultError::task(e.to_string()))?;
        let loaded = match loaded {
            Ok(set) => set,
            Err(e) => {
                self.faults.report(
                    Fault::new("sub-key set unreadable, starting empty")
                        .with_key(parent)
                        .with_cause(&e),
                );
                HashSet::new()
            }
        };
        let mut sets = self.sets.write();
        let slot = sets.entry(parent.to_string()).or_default();
        for name in loaded {
            if !slot.removed.contains(&name) {
                slot.names.insert(name);
            }
        }
        Ok(())
    }

    /// Register a child name under a parent. Returns whether it was new.
    ///
    /// # Errors
    ///
    /// Returns an error if the lazy initial load dies.
    pub async fn register(&self, parent: &str, child: &str) -> VaultResult<bool> {
        self.ensure_loaded(parent).await?;
        let inserted = {
            let mut sets = self.sets.write();
            let slot = sets.entry(parent.to_string()).or_default();
            slot.removed.remove(child);
            slot.names.insert(child.to_string())
        };
        if inserted {
            self.dirty.lock().insert(parent.to_string());
            self.scheduler.poke();
        }
        Ok(inserted)
    }

    /// Explicitly remove a child name. Returns whether it was present.
    ///
    /// The removal survives the union merge: a tombstone keeps the name out
    /// of the next flush even if it is still present on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the lazy initial load dies.
    pub async fn remove(&self, parent: &str, child: &str) -> VaultResult<bool> {
        self.ensure_loaded(parent).await?;
        let removed = {
            let mut sets = self.sets.write();
            let slot = sets.entry(parent.to_string()).or_default();
            let removed = slot.names.remove(child);
            if removed {
                slot.removed.insert(child.to_string());
            }
            removed
        };
        if removed {
            self.dirty.lock().insert(parent.to_string());
            self.scheduler.poke();
        }
        Ok(removed)
    }

    /// Drop every child of a parent, memory and disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted set cannot be deleted.
    pub async fn clear(&self, parent: &str) -> VaultResult<()> {
        {
            let mut sets = self.sets.write();
            sets.insert(parent.to_string(), ParentSet::default());
        }
        self.dirty.lock().remove(parent);
        let path = file_path(&self.root, parent);
        tokio::task::spawn_blocking(move || kvault_storage::remove_file(&path))
            .await
            .map_err(|e| VaultError::task(e.to_string()))??;
        Ok(())
    }

    /// Whether a child is registered under a parent.
    ///
    /// # Errors
    ///
    /// Returns an error if the lazy initial load dies.
    pub async fn contains(&self, parent: &str, child: &str) -> VaultResult<bool> {
        self.ensure_loaded(parent).await?;
        Ok(self
            .sets
            .read()
            .get(parent)
            .is_some_and(|set| set.names.contains(child)))
    }

    /// Sorted snapshot of the children registered under a parent.
    ///
    /// # Errors
    ///
    /// Returns an error if the lazy initial load dies.
    pub async fn names(&self, parent: &str) -> VaultResult<Vec<String>> {
        self.ensure_loaded(parent).await?;
        let mut names: Vec<String> = self
            .sets
            .read()
            .get(parent)
            .map(|set| set.names.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    /// Run the pending merge immediately. Used on graceful shutdown.
    pub async fn flush(&self) {
        self.scheduler.flush_now().await;
    }

    /// Entry name the persisted set is framed under, for a given parent.
    #[must_use]
    pub fn entry_name(&self, parent: &str) -> String {
        format!("{parent}{SUBKEY_SUFFIX}")
    }
}
