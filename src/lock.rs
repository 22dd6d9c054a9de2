//! File locking and atomic writes for tally
//!
//! This module provides the concurrency primitives the stores build on:
//! - Exclusive advisory locks (fs2/flock) on per-entity lock files
//! - Ordered acquisition of several locks at once ([`LockSet`])
//! - Atomic write pattern (write temp + rename)
//!
//! Each acquisition opens its own file description, so a lock held by one
//! thread also excludes other threads of the same process.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Default lock timeout in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Default retry interval when waiting for a lock
const LOCK_RETRY_INTERVAL_MS: u64 = 5;

fn is_lock_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    // On Windows, fs2/libc can surface lock/sharing violations as "Other".
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

/// A file lock guard that releases the lock when dropped
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire an exclusive lock on a file with timeout
    ///
    /// If the file doesn't exist, it will be created.
    /// Returns `Error::LockFailed` if the lock cannot be acquired within the timeout.
    pub fn acquire(path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;

        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        let retry_interval = Duration::from_millis(LOCK_RETRY_INTERVAL_MS);

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(FileLock {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if is_lock_contended(&e) => {
                    if start.elapsed() >= timeout {
                        return Err(Error::LockFailed(path.to_path_buf()));
                    }
                    std::thread::sleep(retry_interval);
                }
                Err(e) => {
                    return Err(Error::Io(e));
                }
            }
        }
    }

    /// Get the path to the locked file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Several entity locks held together
///
/// Paths are sorted and deduplicated before acquisition, so two sets that
/// overlap always lock their common entities in the same order and cannot
/// deadlock against each other.
#[derive(Debug)]
pub struct LockSet {
    locks: Vec<FileLock>,
}

impl LockSet {
    pub fn acquire<I>(paths: I, timeout_ms: u64) -> Result<Self>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut ordered: Vec<PathBuf> = paths.into_iter().collect();
        ordered.sort();
        ordered.dedup();

        let mut locks = Vec::with_capacity(ordered.len());
        for path in ordered {
            // On failure the locks taken so far drop here and are released.
            locks.push(FileLock::acquire(&path, timeout_ms)?);
        }
        Ok(LockSet { locks })
    }

    pub fn holds(&self, path: &Path) -> bool {
        self.locks.iter().any(|lock| lock.path() == path)
    }
}

/// Atomically write data to a file
///
/// Writes to a uniquely named temporary file in the same directory, then
/// renames it over the target. Readers see either the old or the new
/// contents, never a partial write.
///
/// Note: This does NOT acquire a lock. Callers coordinate through the
/// entity locks.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("doc");
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let result = (|| -> Result<()> {
        let mut temp_file = File::create(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        drop(temp_file);
        fs::rename(&temp_path, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}
