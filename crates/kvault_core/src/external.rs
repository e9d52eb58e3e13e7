//! The external store: one file per key.
//!
//! Each key maps to a file named by the hash of the key under `external/`.
//! Operations on the same key are chained through a per-key queue so a read
//! never races a write to the same file; operations on different keys
//! interleave freely. Writes are atomic, and the removable sweep inspects
//! only a bounded header prefix of each file.

use crate::error::{Fault, Faults, VaultResult};
use crate::queue::KeyQueue;
use kvault_codec::{
    decode_entry, decode_header, encode_entry, hash36, Entry, Header, MAX_HEADER_LEN,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the per-key file directory inside the vault root.
pub const EXTERNAL_DIR: &str = "external";

/// Per-key file storage with submission-ordered operations per key.
pub struct ExternalStore {
    dir: PathBuf,
    queue: KeyQueue,
    faults: Faults,
}

impl ExternalStore {
    /// Open the store, creating the `external/` directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub(crate) fn open(root: &Path, faults: Faults) -> VaultResult<Self> {
        let dir = root.join(EXTERNAL_DIR);
        kvault_storage::ensure_dir(&dir)?;
        Ok(Self {
            dir,
            queue: KeyQueue::new(),
            faults,
        })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(hash36(name))
    }

    /// Write an entry to its own file, atomically.
    ///
    /// The operation is chained behind any in-flight operation for the same
    /// key; the chain link is established before this function returns.
    pub fn write(&self, entry: Entry) -> impl Future<Output = VaultResult<()>> + Send + 'static {
        let path = self.path_for(&entry.name);
        let faults = self.faults.clone();
        self.queue.enqueue(&entry.name.clone(), async move {
            let name = entry.name.clone();
            let result = run_blocking(move || {
                let bytes = encode_entry(&entry.store, &entry.name, &entry.value, entry.flags)?;
                kvault_storage::atomic_write(&path, &bytes)?;
                Ok(())
            })
            .await;
            if let Err(e) = &result {
                faults.report(Fault::new("external write failed").with_key(name.as_str()).with_cause(e));
            }
            result
        })
    }

    /// Read the entry for a key. Absent or empty files read as `None`; a
    /// corrupt file reads as `None` with a fault reported.
    pub fn read(&self, name: &str) -> impl Future<Output = VaultResult<Option<Entry>>> + Send + 'static {
        let path = self.path_for(name);
        let faults = self.faults.clone();
        let name = name.to_string();
        self.queue.enqueue(&name.clone(), async move {
            let bytes = match run_blocking(move || Ok(kvault_storage::read_file(&path)?)).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    faults.report(Fault::new("external read failed").with_key(name.as_str()).with_cause(&e));
                    return Err(e);
                }
            };
            let Some(bytes) = bytes else { return Ok(None) };
            match decode_entry(&bytes) {
                Some(entry) => Ok(Some(entry)),
                None => {
                    faults.report(Fault::new("external entry is undecodable").with_key(name.as_str()));
                    Ok(None)
                }
            }
        })
    }

    /// Remove the file for a key. Returns whether a file existed.
    pub fn remove(&self, name: &str) -> impl Future<Output = VaultResult<bool>> + Send + 'static {
        let path = self.path_for(name);
        let faults = self.faults.clone();
        let name = name.to_string();
        self.queue.enqueue(&name.clone(), async move {
            let result = run_blocking(move || Ok(kvault_storage::remove_file(&path)?)).await;
            if let Err(e) = &result {
                faults.report(Fault::new("external remove failed").with_key(name.as_str()).with_cause(e));
            }
            result
        })
    }

    /// Whether a non-empty file exists for this key.
    pub fn exists(&self, name: &str) -> impl Future<Output = bool> + Send + 'static {
        let path = self.path_for(name);
        self.queue.enqueue(name, async move {
            tokio::task::spawn_blocking(move || kvault_storage::file_has_content(&path))
                .await
                .unwrap_or(false)
        })
    }

    /// Synchronous read for callers that tolerate blocking I/O.
    ///
    /// Bypasses the per-key queue; the atomic write pattern still guarantees
    /// the file observed is a complete, consistent payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn read_blocking(&self, name: &str) -> VaultResult<Option<Entry>> {
        let Some(bytes) = kvault_storage::read_file(&self.path_for(name))? else {
            return Ok(None);
        };
        match decode_entry(&bytes) {
            Some(entry) => Ok(Some(entry)),
            None => {
                self.faults
                    .report(Fault::new("external entry is undecodable").with_key(name));
                Ok(None)
            }
        }
    }

    /// Synchronous existence check.
    #[must_use]
    pub fn exists_blocking(&self, name: &str) -> bool {
        kvault_storage::file_has_content(&self.path_for(name))
    }

    /// Decode every stored entry. Corrupt or unreadable files are skipped
    /// with a fault reported.
    pub async fn entries(&self) -> VaultResult<Vec<Entry>> {
        let files = kvault_storage::list_files(&self.dir)?;
        let faults = self.faults.clone();
        let decoded = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            for path in files {
                match kvault_storage::read_file(&path) {
                    Ok(Some(bytes)) => match decode_entry(&bytes) {
                        Some(entry) => out.push(entry),
                        None => faults.report(
                            Fault::new(format!("skipping undecodable file {}", path.display())),
                        ),
                    },
                    Ok(None) => {}
                    Err(e) => faults.report(
                        Fault::new(format!("skipping unreadable file {}", path.display()))
                            .with_cause(&e),
                    ),
                }
            }
            out
        })
        .await
        .unwrap_or_default();
        Ok(decoded)
    }

    /// Header view of every stored entry via bounded prefix reads.
    pub async fn headers(&self) -> VaultResult<Vec<Header>> {
        let files = kvault_storage::list_files(&self.dir)?;
        let faults = self.faults.clone();
        let headers = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            for path in files {
                match kvault_storage::read_prefix(&path, MAX_HEADER_LEN) {
                    Ok(Some(prefix)) => match decode_header(&prefix) {
                        Some(header) => out.push(header),
                        None => faults.report(
                            Fault::new(format!("skipping undecodable file {}", path.display())),
                        ),
                    },
                    Ok(None) => {}
                    Err(e) => faults.report(
                        Fault::new(format!("skipping unreadable file {}", path.display()))
                            .with_cause(&e),
                    ),
                }
            }
            out
        })
        .await
        .unwrap_or_default();
        Ok(headers)
    }

    /// Delete every file whose removable flag is set.
    ///
    /// Only a bounded header prefix of each file is read; the payload is
    /// never decoded. Per-file failures are reported and skipped; the sweep
    /// always visits every file. Returns the stored names that were removed.
    pub async fn clear_removable(&self) -> VaultResult<Vec<Header>> {
        let files = kvault_storage::list_files(&self.dir)?;
        let faults = self.faults.clone();
        let removed = tokio::task::spawn_blocking(move || {
            let mut removed = Vec::new();
            for path in files {
                let header = match kvault_storage::read_prefix(&path, MAX_HEADER_LEN) {
                    Ok(Some(prefix)) => decode_header(&prefix),
                    Ok(None) => None,
                    Err(e) => {
                        faults.report(
                            Fault::new(format!("skipping unreadable file {}", path.display()))
                                .with_cause(&e),
                        );
                        continue;
                    }
                };
                let Some(header) = header else { continue };
                if !header.flags.is_removable() {
                    continue;
                }
                match kvault_storage::remove_file(&path) {
                    Ok(_) => removed.push(header),
                    Err(e) => faults.report(
                        Fault::new(format!("failed to delete {}", path.display()))
                            .with_key(header.name.as_str())
                            .with_cause(&e),
                    ),
                }
            }
            removed
        })
        .await
        .unwrap_or_default();
        debug!(removed = removed.len(), "external removable sweep");
        Ok(removed)
    }

    /// Delete every stored file.
    ///
    /// Unlike the removable sweep, this aborts and propagates on the first
    /// deletion failure: a consistent "everything is cleared" answer
    /// matters more here than best-effort progress.
    ///
    /// # Errors
    ///
    /// Returns the first deletion error encountered.
    pub async fn clear(&self) -> VaultResult<()> {
        let files = kvault_storage::list_files(&self.dir)?;
        let faults = self.faults.clone();
        tokio::task::spawn_blocking(move || -> VaultResult<()> {
            for path in files {
                if let Err(e) = kvault_storage::remove_file(&path) {
                    faults.report(
                        Fault::new(format!("clear aborted at {}", path.display())).with_cause(&e),
                    );
                    return Err(e.into());
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| crate::error::VaultError::task(e.to_string()))?
    }
}

/// Run a fallible blocking closure on the blocking pool.
async fn run_blocking<T, F>(f: F) -> VaultResult<T>
where
    F: FnOnce() -> VaultResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| crate::error::VaultError::task(e.to_string()))?
}
