//! The vault facade: typed operations routed by key policy.

use crate::change_feed::{ChangeEvent, ChangeFeed};
use crate::config::Config;
use crate::encrypter::Encrypter;
use crate::error::{Fault, FaultSink, Faults, VaultError, VaultResult};
use crate::external::ExternalStore;
use crate::internal::InternalStore;
use crate::key::KeySpec;
use crate::subkeys::SubKeyIndex;
use kvault_codec::{hash36, CodecError, Entry, Header, TypeTag, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// The main vault handle.
///
/// A `Vault` owns one root directory and routes every operation by the
/// key's placement policy: internal keys live in the consolidated
/// [`InternalStore`], external keys get one file each in the
/// [`ExternalStore`], and secure keys additionally pass through the
/// injected [`Encrypter`] on the way in and out.
///
/// # Opening a vault
///
/// ```rust,ignore
/// use kvault_core::{KeySpec, Value, Vault};
///
/// let vault = Vault::builder("/path/to/root").open().await?;
/// let counter = KeySpec::new("counter");
///
/// vault.write(&counter, Value::Int(1)).await?;
/// assert_eq!(vault.read(&counter).await?, Some(Value::Int(1)));
/// ```
pub struct Vault {
    name: String,
    root: PathBuf,
    internal: InternalStore,
    external: ExternalStore,
    subkeys: SubKeyIndex,
    encrypter: Option<Arc<dyn Encrypter>>,
    feed: ChangeFeed,
    faults: Faults,
}

/// Builder for [`Vault`]. Keys are bound to the instance this produces;
/// there is no process-wide registry.
pub struct VaultBuilder {
    root: PathBuf,
    name: String,
    config: Config,
    encrypter: Option<Arc<dyn Encrypter>>,
    sink: Option<FaultSink>,
}

impl VaultBuilder {
    /// Sets the store name written into every frame.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the full configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Sets the flush debounce window.
    #[must_use]
    pub fn debounce(mut self, window: Duration) -> Self {
        self.config.debounce = window;
        self
    }

    /// Injects the encrypter used by secure keys.
    #[must_use]
    pub fn encrypter(mut self, encrypter: Arc<dyn Encrypter>) -> Self {
        self.encrypter = Some(encrypter);
        self
    }

    /// Installs the callback invoked with every recoverable fault.
    #[must_use]
    pub fn error_sink(mut self, sink: FaultSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Open the vault: initialize the encrypter, load the consolidated
    /// file, and prepare the external directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the encrypter fails to initialize, the root is
    /// missing with `create_if_missing` off, or the directories cannot be
    /// created. A corrupt consolidated file is not an error here: it is
    /// reported through the sink and the store starts empty.
    pub async fn open(self) -> VaultResult<Vault> {
        if let Some(encrypter) = &self.encrypter {
            encrypter.init()?;
        }
        if !self.config.create_if_missing && !self.root.is_dir() {
            return Err(VaultError::initialization(format!(
                "root {} does not exist",
                self.root.display()
            )));
        }

        let faults = Faults::new(self.sink);
        let internal = InternalStore::open(
            &self.root,
            &self.config.store_file,
            self.config.debounce,
            faults.clone(),
        )
        .await?;
        let external = ExternalStore::open(&self.root, faults.clone())?;
        let subkeys = SubKeyIndex::new(&self.root, &self.name, self.config.debounce, faults.clone());

        debug!(root = %self.root.display(), name = %self.name, "vault opened");
        Ok(Vault {
            name: self.name,
            root: self.root,
            internal,
            external,
            subkeys,
            encrypter: self.encrypter,
            feed: ChangeFeed::new(),
            faults,
        })
    }
}

impl Vault {
    /// Start building a vault rooted at `root`.
    pub fn builder(root: impl Into<PathBuf>) -> VaultBuilder {
        VaultBuilder {
            root: root.into(),
            name: "main".to_string(),
            config: Config::default(),
            encrypter: None,
            sink: None,
        }
    }

    /// Open a vault with default configuration.
    ///
    /// # Errors
    ///
    /// See [`VaultBuilder::open`].
    pub async fn open(root: impl Into<PathBuf>) -> VaultResult<Vault> {
        Self::builder(root).open().await
    }

    /// The store name written into frames.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Subscribe to the change feed. Every mutation emits the logical key
    /// name that changed; `clear` emits one event per known key.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    /// The sub-key index for keys that enumerate dynamic children.
    #[must_use]
    pub fn subkeys(&self) -> &SubKeyIndex {
        &self.subkeys
    }

    /// Number of completed consolidated-file flushes.
    #[must_use]
    pub fn flush_count(&self) -> u64 {
        self.internal.flush_count()
    }

    /// Write a value under a key.
    ///
    /// The in-memory state is updated before this returns; persistence is
    /// debounced (internal keys) or already durable (external keys).
    ///
    /// # Errors
    ///
    /// Returns an error if the name is too long, the value is
    /// unserializable, encryption fails, or (for external keys) the file
    /// write fails. Every error is also reported to the sink.
    pub async fn write(&self, key: &KeySpec, value: Value) -> VaultResult<()> {
        let entry = self.make_entry(key, value).map_err(|e| self.surface(key, e))?;
        if key.external {
            self.external.write(entry).await?;
        } else {
            self.internal.write(entry);
        }
        self.feed.emit(ChangeEvent::write(key.name.as_str()));
        Ok(())
    }

    /// Read the value stored under a key.
    ///
    /// Internal keys are served synchronously from memory; external keys
    /// read their file through the per-key queue. An absent value, or a
    /// secure value that fails to decrypt, reads as `None`.
    ///
    /// # Errors
    ///
    /// Returns an error only for I/O failures on external keys. Corruption
    /// and decrypt failures degrade to `None` with a fault reported.
    pub async fn read(&self, key: &KeySpec) -> VaultResult<Option<Value>> {
        let stored = if key.external {
            self.external.read(&self.storage_name(key)).await?
        } else {
            self.internal.read(&self.storage_name(key))
        };
        let Some(entry) = stored else {
            return Ok(None);
        };
        if key.secure {
            Ok(self.unseal(&key.name, &entry))
        } else {
            Ok(Some(entry.value))
        }
    }

    /// Read the value under a key, or `default` on any failure or absence.
    /// This variant never fails.
    pub async fn read_or(&self, key: &KeySpec, default: Value) -> Value {
        match self.read(key).await {
            Ok(Some(value)) => value,
            Ok(None) | Err(_) => default,
        }
    }

    /// Serialize a typed value and write it under a key.
    ///
    /// # Errors
    ///
    /// As [`Vault::write`], plus serde serialization failures.
    pub async fn write_typed<T: Serialize>(&self, key: &KeySpec, value: &T) -> VaultResult<()> {
        let json = serde_json::to_value(value)
            .map_err(|e| VaultError::Codec(CodecError::serialize(e.to_string())))?;
        self.write(key, Value::from_json(&json)).await
    }

    /// Read and deserialize a typed value.
    ///
    /// # Errors
    ///
    /// As [`Vault::read`], plus serde deserialization failures.
    pub async fn read_typed<T: DeserializeOwned>(&self, key: &KeySpec) -> VaultResult<Option<T>> {
        let Some(value) = self.read(key).await? else {
            return Ok(None);
        };
        let json = value.to_json().map_err(VaultError::Codec)?;
        serde_json::from_value(json)
            .map(Some)
            .map_err(|e| VaultError::Codec(CodecError::serialize(e.to_string())))
    }

    /// Remove the entry for a key. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the external file cannot be deleted.
    pub async fn remove(&self, key: &KeySpec) -> VaultResult<bool> {
        let name = self.storage_name(key);
        let removed = if key.external {
            self.external.remove(&name).await?
        } else {
            self.internal.remove(&name)
        };
        if removed {
            self.feed.emit(ChangeEvent::remove(key.name.as_str()));
        }
        Ok(removed)
    }

    /// Whether a value is stored under a key.
    pub async fn exists(&self, key: &KeySpec) -> bool {
        if key.external {
            self.external.exists(&self.storage_name(key)).await
        } else {
            self.internal.exists(&self.storage_name(key))
        }
    }

    /// Remove every entry from both stores, unconditionally.
    ///
    /// Secure and external entries are cleared like any other; the
    /// removable flag only scopes [`Vault::clear_removable`]. One remove
    /// event is emitted per key known at the time of the call.
    ///
    /// # Errors
    ///
    /// Aborts and propagates on the first external deletion failure; the
    /// internal store is untouched in that case.
    pub async fn clear(&self) -> VaultResult<()> {
        let keys = self.keys().await?;
        self.external.clear().await?;
        self.internal.clear();
        self.feed.emit_all(keys.into_iter().map(ChangeEvent::remove));
        Ok(())
    }

    /// Remove every entry whose removable flag is set, in both stores.
    ///
    /// Internal entries are swept by their in-memory flags; external files
    /// by a bounded header-prefix read. Per-item failures are reported and
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the external directory cannot be listed.
    pub async fn clear_removable(&self) -> VaultResult<()> {
        let removed_internal = self.internal.clear_removable();
        let removed_external = self.external.clear_removable().await?;

        let mut events = Vec::new();
        for entry in &removed_internal {
            let key = self
                .logical_name(entry)
                .unwrap_or_else(|| entry.name.clone());
            events.push(ChangeEvent::remove(key));
        }
        for header in &removed_external {
            events.push(ChangeEvent::remove(header.name.as_str()));
        }
        self.feed.emit_all(events);
        Ok(())
    }

    /// Enumerate every logical key name currently stored.
    ///
    /// Secure entries recover their logical name from the decrypted
    /// envelope; an entry whose envelope cannot be opened is skipped with a
    /// fault, and enumeration continues.
    ///
    /// # Errors
    ///
    /// Returns an error if the external directory cannot be listed.
    pub async fn keys(&self) -> VaultResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in self.internal.entries().values() {
            if let Some(name) = self.logical_name(entry) {
                names.push(name);
            }
        }
        for entry in self.external.entries().await? {
            if let Some(name) = self.logical_name(&entry) {
                names.push(name);
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Header snapshot of every stored entry, cheapest full enumeration.
    ///
    /// Secure entries appear under their stored (hashed) names here; use
    /// [`Vault::keys`] for logical names.
    ///
    /// # Errors
    ///
    /// Returns an error if the external directory cannot be listed.
    pub async fn headers(&self) -> VaultResult<Vec<Header>> {
        let mut headers = self.internal.headers();
        headers.extend(self.external.headers().await?);
        Ok(headers)
    }

    /// Flush all pending debounced state now. Used on graceful shutdown.
    pub async fn flush(&self) {
        self.internal.flush().await;
        self.subkeys.flush().await;
    }

    /// Flush and drop the vault.
    pub async fn close(self) {
        self.flush().await;
        debug!(root = %self.root.display(), "vault closed");
    }

    /// The on-disk key name: secure keys are stored under a one-way hash of
    /// the logical name, which enumeration undoes via the envelope.
    fn storage_name(&self, key: &KeySpec) -> String {
        if key.secure {
            hash36(&key.name)
        } else {
            key.name.clone()
        }
    }

    fn make_entry(&self, key: &KeySpec, value: Value) -> VaultResult<Entry> {
        if key.name.len() > 255 {
            return Err(CodecError::NameTooLong {
                len: key.name.len(),
            }
            .into());
        }
        if key.secure {
            let encrypter = self
                .encrypter
                .as_ref()
                .ok_or_else(|| VaultError::NoEncrypter {
                    name: key.name.clone(),
                })?;
            let envelope = serde_json::json!({
                "k": key.name,
                "t": value.type_tag().as_u8(),
                "v": value.to_json()?,
            });
            let ciphertext = encrypter.encrypt(&envelope.to_string())?;
            Ok(Entry::new(
                &self.name,
                hash36(&key.name),
                Value::Str(ciphertext),
                key.flags(),
            ))
        } else {
            // Surface unserializable values now rather than at flush time
            value.to_json()?;
            Ok(Entry::new(&self.name, &key.name, value, key.flags()))
        }
    }

    /// Open a secure entry's envelope and return the value, verifying the
    /// envelope names the expected logical key.
    fn unseal(&self, logical: &str, entry: &Entry) -> Option<Value> {
        let (k, value) = self.open_envelope(entry)?;
        if k != logical {
            self.faults.report(
                Fault::new("secure envelope names a different key").with_key(logical),
            );
            return None;
        }
        Some(value)
    }

    /// The logical name of an entry: the stored name, or for secure entries
    /// the name recovered from the envelope.
    fn logical_name(&self, entry: &Entry) -> Option<String> {
        if entry.flags.is_secure() {
            self.open_envelope(entry).map(|(k, _)| k)
        } else {
            Some(entry.name.clone())
        }
    }

    fn open_envelope(&self, entry: &Entry) -> Option<(String, Value)> {
        let Some(encrypter) = &self.encrypter else {
            self.faults.report(
                Fault::new("secure entry present but no encrypter configured")
                    .with_key(entry.name.as_str()),
            );
            return None;
        };
        let Some(ciphertext) = entry.value.as_str() else {
            self.faults.report(
                Fault::new("secure entry payload is not a ciphertext string")
                    .with_key(entry.name.as_str()),
            );
            return None;
        };
        let plaintext = match encrypter.decrypt(ciphertext) {
            Ok(p) => p,
            Err(e) => {
                self.faults.report(
                    Fault::new("decrypt failed")
                        .with_key(entry.name.as_str())
                        .with_cause(&e),
                );
                return None;
            }
        };
        let json: serde_json::Value = match serde_json::from_str(&plaintext) {
            Ok(j) => j,
            Err(e) => {
                self.faults.report(
                    Fault::new("secure envelope is not valid JSON")
                        .with_key(entry.name.as_str())
                        .with_cause(&e),
                );
                return None;
            }
        };
        let (Some(k), Some(v)) = (json.get("k").and_then(|k| k.as_str()), json.get("v")) else {
            self.faults.report(
                Fault::new("secure envelope is missing its fields").with_key(entry.name.as_str()),
            );
            return None;
        };
        let value = match json
            .get("t")
            .and_then(serde_json::Value::as_u64)
            .and_then(|t| u8::try_from(t).ok())
            .and_then(TypeTag::from_u8)
        {
            Some(tag) => Value::from_json_tagged(tag, v)?,
            // Envelopes from older writers carry no tag; infer structurally
            None => Value::from_json(v),
        };
        Some((k.to_string(), value))
    }

    /// Report a single-key failure to the sink and hand the error back to
    /// the caller.
    fn surface(&self, key: &KeySpec, error: VaultError) -> VaultError {
        self.faults.report(
            Fault::new("operation failed")
                .with_key(key.name.as_str())
                .with_cause(&error),
        );
        error
    }
}
