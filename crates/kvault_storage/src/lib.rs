//! # kvault storage
//!
//! Atomic file primitives for kvault.
//!
//! This crate is the lowest layer of the engine: plain, synchronous
//! `std::fs` operations with one invariant: a live file is never written
//! in place. Writes go to a `.tmp` sibling and are renamed over the target,
//! so a crash at any point leaves the previous consistent file untouched.
//!
//! Async callers in `kvault_core` wrap these functions in
//! `tokio::task::spawn_blocking`; this crate stays runtime-free.
//!
//! ## Example
//!
//! ```no_run
//! use kvault_storage::{atomic_write, read_file};
//! use std::path::Path;
//!
//! let path = Path::new("data.bin");
//! atomic_write(path, b"payload").unwrap();
//! assert_eq!(read_file(path).unwrap().unwrap(), b"payload");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod atomic;
mod error;

pub use atomic::{
    atomic_write, ensure_dir, file_has_content, list_files, read_file, read_prefix, remove_file,
    TMP_SUFFIX,
};
pub use error::{StorageError, StorageResult};
