//! Storage layer for tally
//!
//! All state lives under a single data directory of JSON documents.
//!
//! # Directory Structure
//!
//! ```text
//! <data-dir>/
//!   tally.toml                  # Optional configuration
//!   tasks/<task-id>.json        # Task documents with embedded completions
//!   accounts/<user-id>.json     # Account balances
//!   journal/<txn-id>.json       # In-flight commit records (empty when idle)
//!   locks/                      # Per-entity lock files
//!     task-<task-id>.lock
//!     account-<user-id>.lock
//!     links.lock                # Serializes link uniqueness checks
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::config::CONFIG_FILE;
use crate::error::{Error, Result};
use crate::lock;

const TASKS_DIR: &str = "tasks";
const ACCOUNTS_DIR: &str = "accounts";
const JOURNAL_DIR: &str = "journal";
const LOCKS_DIR: &str = "locks";
const MAX_ENTITY_ID_LEN: usize = 128;

/// Storage manager for tally state
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    faults: Option<Arc<FaultInjector>>,
}

impl Storage {
    /// Create a storage manager rooted at the given data directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            faults: None,
        }
    }

    /// Route every write and removal through a fault injector
    pub fn with_faults(mut self, faults: Arc<FaultInjector>) -> Self {
        self.faults = Some(faults);
        self
    }

    // =========================================================================
    // Path accessors
    // =========================================================================

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join(TASKS_DIR)
    }

    pub fn accounts_dir(&self) -> PathBuf {
        self.root.join(ACCOUNTS_DIR)
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.root.join(JOURNAL_DIR)
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join(LOCKS_DIR)
    }

    pub fn task_file(&self, task_id: &str) -> PathBuf {
        self.tasks_dir().join(format!("{task_id}.json"))
    }

    pub fn account_file(&self, user_id: &str) -> PathBuf {
        self.accounts_dir().join(format!("{user_id}.json"))
    }

    pub fn journal_file(&self, txn_id: &str) -> PathBuf {
        self.journal_dir().join(format!("{txn_id}.json"))
    }

    pub fn task_lock(&self, task_id: &str) -> PathBuf {
        self.locks_dir().join(format!("task-{task_id}.lock"))
    }

    pub fn account_lock(&self, user_id: &str) -> PathBuf {
        self.locks_dir().join(format!("account-{user_id}.lock"))
    }

    pub fn links_lock(&self) -> PathBuf {
        self.locks_dir().join("links.lock")
    }

    // =========================================================================
    // Directory initialization
    // =========================================================================

    /// Create the data directory structure
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(self.tasks_dir())?;
        fs::create_dir_all(self.accounts_dir())?;
        fs::create_dir_all(self.journal_dir())?;
        fs::create_dir_all(self.locks_dir())?;
        Ok(())
    }

    /// Check if storage has been initialized
    pub fn is_initialized(&self) -> bool {
        self.tasks_dir().is_dir() && self.accounts_dir().is_dir()
    }

    // =========================================================================
    // Document I/O
    // =========================================================================

    /// Write a JSON document atomically (temp file + rename)
    pub fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        self.check_fault(path)?;
        let json = serde_json::to_vec_pretty(data)?;
        lock::write_atomic(path, &json)
    }

    /// Read a JSON document
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = fs::read(path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    /// Read a JSON document, returning `None` when it does not exist
    pub fn read_json_opt<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match fs::read(path) {
            Ok(content) => Ok(Some(serde_json::from_slice(&content)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::Io(err)),
        }
    }

    /// Remove a document; removing a missing document is not an error
    pub fn remove(&self, path: &Path) -> Result<()> {
        self.check_fault(path)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::Io(err)),
        }
    }

    /// Read every JSON document in a directory, ordered by file name
    pub fn read_dir_json<T: DeserializeOwned>(&self, dir: &Path) -> Result<Vec<T>> {
        let mut paths = self.list_json_paths(dir)?;
        paths.sort();

        let mut docs = Vec::with_capacity(paths.len());
        for path in paths {
            // A document removed between listing and reading is skipped.
            if let Some(doc) = self.read_json_opt(&path)? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    /// Paths of the JSON documents in a directory, skipping temp files
    pub fn list_json_paths(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }

        Ok(fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                let hidden = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with('.'))
                    .unwrap_or(true);
                !hidden && path.extension().and_then(|ext| ext.to_str()) == Some("json")
            })
            .collect())
    }

    fn check_fault(&self, path: &Path) -> Result<()> {
        match &self.faults {
            Some(faults) => faults.check(path),
            None => Ok(()),
        }
    }
}

/// Whether an id is usable as a document file name.
pub fn is_valid_entity_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_ENTITY_ID_LEN
        && !id.starts_with('.')
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
}

/// Injects IO failures into writes whose path contains a target fragment
///
/// The first `skip` matching writes succeed, the next `count` fail with an
/// IO error, and everything after that succeeds again.
#[derive(Debug)]
pub struct FaultInjector {
    target: String,
    skip: AtomicUsize,
    remaining: AtomicUsize,
    tripped: AtomicUsize,
}

impl FaultInjector {
    pub fn fail_writes(target: impl Into<String>, count: usize) -> Self {
        Self {
            target: target.into(),
            skip: AtomicUsize::new(0),
            remaining: AtomicUsize::new(count),
            tripped: AtomicUsize::new(0),
        }
    }

    pub fn after(self, skip: usize) -> Self {
        self.skip.store(skip, Ordering::SeqCst);
        self
    }

    /// Number of writes that have been failed so far
    pub fn tripped(&self) -> usize {
        self.tripped.load(Ordering::SeqCst)
    }

    fn check(&self, path: &Path) -> Result<()> {
        if !path.to_string_lossy().contains(self.target.as_str()) {
            return Ok(());
        }
        if decrement(&self.skip) {
            return Ok(());
        }
        if decrement(&self.remaining) {
            self.tripped.fetch_add(1, Ordering::SeqCst);
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("injected write fault: {}", path.display()),
            )));
        }
        Ok(())
    }
}

fn decrement(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |value| value.checked_sub(1))
        .is_ok()
}
