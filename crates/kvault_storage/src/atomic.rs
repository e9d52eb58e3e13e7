//! Atomic file operations.
//!
//! Every write in kvault goes through the temp-suffix-then-rename pattern:
//! the payload lands in `<path>.tmp` first and is renamed over the live file
//! only once fully written. A crash mid-write leaves the previous file
//! byte-for-byte intact. No other write mode is used anywhere in the engine.

use crate::error::{StorageError, StorageResult};
use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};

/// Suffix used for in-flight temporary files.
pub const TMP_SUFFIX: &str = "tmp";

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

/// Atomically replace the file at `path` with `bytes`.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be written or the rename
/// fails. The live file is never left half-written.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes).map_err(|e| StorageError::at(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| StorageError::at(path, e))?;
    Ok(())
}

/// Read a whole file. An absent or empty file reads as `None`, not an error.
///
/// # Errors
///
/// Returns an error for any failure other than the file being absent.
pub fn read_file(path: &Path) -> StorageResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) if bytes.is_empty() => Ok(None),
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::at(path, e)),
    }
}

/// Read at most the first `max` bytes of a file.
///
/// Used for header-only inspection: the caller gets enough bytes to decode
/// framing metadata without paying for the payload. Absent or empty files
/// read as `None`.
///
/// # Errors
///
/// Returns an error for any failure other than the file being absent.
pub fn read_prefix(path: &Path, max: usize) -> StorageResult<Option<Vec<u8>>> {
    let mut file = match fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::at(path, e)),
    };
    let mut buf = vec![0u8; max];
    let mut read = 0usize;
    while read < max {
        match file.read(&mut buf[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(StorageError::at(path, e)),
        }
    }
    buf.truncate(read);
    if buf.is_empty() {
        return Ok(None);
    }
    Ok(Some(buf))
}

/// Remove a file. Returns whether a file was actually removed; an already
/// absent file is not an error.
///
/// # Errors
///
/// Returns an error for any failure other than the file being absent.
pub fn remove_file(path: &Path) -> StorageResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::at(path, e)),
    }
}

/// Whether a file exists with non-zero length.
#[must_use]
pub fn file_has_content(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// Create a directory and all of its parents.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> StorageResult<()> {
    fs::create_dir_all(path).map_err(|e| StorageError::at(path, e))?;
    Ok(())
}

/// List the regular files directly inside `dir`, skipping in-flight
/// temporary files. A missing directory lists as empty.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn list_files(dir: &Path) -> StorageResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::at(dir, e)),
    };
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::at(dir, e))?;
        let path = entry.path();
        let is_tmp = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == TMP_SUFFIX);
        if path.is_file() && !is_tmp {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");

        atomic_write(&path, b"hello").unwrap();
        assert_eq!(read_file(&path).unwrap().unwrap(), b"hello");
    }

    #[test]
    fn write_replaces_previous_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");

        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(read_file(&path).unwrap().unwrap(), b"second");
    }

    #[test]
    fn no_tmp_file_left_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");

        atomic_write(&path, b"payload").unwrap();
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn interrupted_write_leaves_previous_file_intact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");

        atomic_write(&path, b"stable").unwrap();
        // Simulate a crash between temp-write and rename: the temp file
        // exists but was never renamed
        fs::write(tmp_path(&path), b"half-written").unwrap();
        assert_eq!(read_file(&path).unwrap().unwrap(), b"stable");
    }

    #[test]
    fn absent_file_reads_as_none() {
        let dir = tempdir().unwrap();
        assert!(read_file(&dir.path().join("missing")).unwrap().is_none());
    }

    #[test]
    fn empty_file_reads_as_none() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();
        assert!(read_file(&path).unwrap().is_none());
        assert!(!file_has_content(&path));
    }

    #[test]
    fn prefix_read_is_bounded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big");
        fs::write(&path, vec![7u8; 10_000]).unwrap();

        let prefix = read_prefix(&path, 64).unwrap().unwrap();
        assert_eq!(prefix.len(), 64);
        assert!(prefix.iter().all(|&b| b == 7));
    }

    #[test]
    fn prefix_read_of_short_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(read_prefix(&path, 64).unwrap().unwrap(), b"abc");
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("victim");
        atomic_write(&path, b"x").unwrap();

        assert!(remove_file(&path).unwrap());
        assert!(!remove_file(&path).unwrap());
    }

    #[test]
    fn list_skips_tmp_files() {
        let dir = tempdir().unwrap();
        atomic_write(&dir.path().join("a"), b"1").unwrap();
        atomic_write(&dir.path().join("b"), b"2").unwrap();
        fs::write(dir.path().join("c.tmp"), b"partial").unwrap();

        let files = list_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn list_of_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        assert!(list_files(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn ensure_dir_creates_nested() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("c");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
