//! # kvault core
//!
//! An embedded, local key-value persistence engine.
//!
//! Small values live in a consolidated in-memory index mirrored to a single
//! binary file; large or per-key values live in individually addressed
//! files. Writes are debounced and atomic, secure values route through an
//! injected encrypter, and every recoverable fault is reported to a
//! structured error sink instead of crashing anything.
//!
//! ## Architecture
//!
//! - [`Vault`]: the facade; routes operations by [`KeySpec`] policy
//! - [`InternalStore`]: in-memory map + one consolidated file, debounced
//!   atomic batch flushes
//! - [`ExternalStore`]: one file per key, submission-ordered per-key
//!   operation queue
//! - [`SubKeyIndex`]: persisted per-parent child-name sets with union-only
//!   merges
//!
//! ## Guarantees
//!
//! - In-memory reads always reflect the latest write; disk is a lagging
//!   mirror
//! - Files are replaced by temp-write-then-rename only; a crash never
//!   corrupts the previous state
//! - Same-key external operations never interleave
//! - Corruption degrades to "key absent" plus a fault report, never to a
//!   startup failure

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod config;
mod encrypter;
mod error;
mod external;
mod flush;
mod internal;
mod key;
mod queue;
mod subkeys;
mod vault;

pub use change_feed::{ChangeEvent, ChangeFeed, ChangeKind};
pub use config::{Config, DEFAULT_STORE_FILE};
pub use encrypter::Encrypter;
pub use error::{Fault, FaultSink, VaultError, VaultResult};
pub use external::{ExternalStore, EXTERNAL_DIR};
pub use internal::InternalStore;
pub use key::KeySpec;
pub use subkeys::{SubKeyIndex, SUBKEY_SUFFIX};
pub use vault::{Vault, VaultBuilder};

// Re-export the codec surface callers interact with directly.
pub use kvault_codec::{hash36, Entry, Flags, Header, TypeTag, Value};
