//! Commit journal for multi-document updates
//!
//! A completion touches three documents: the task and two accounts. Before
//! any of them is written, a record holding the before- and after-image of
//! each document is stored under `journal/`. Removing that record is the
//! commit point.
//!
//! Basic semantics:
//! - A failure before the commit point restores the before-images written so far
//! - A record left behind by a crash is rolled back by [`Journal::recover`]
//! - Recovery takes the same entity locks as the commit that wrote the record
//! - Rolling back only touches documents still at their after-image; a
//!   document matching neither image is a conflict and nothing is written
//! - Mutations lock through [`Journal::lock_settled`], which rolls back dead
//!   records on the entities they are about to change

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::account::Account;
use crate::error::{Error, Result};
use crate::lock::LockSet;
use crate::storage::Storage;
use crate::task::Task;

/// Bound on lock-widening rounds in [`Journal::lock_settled`]
const MAX_SETTLE_ROUNDS: usize = 4;

/// Where a stored document stands relative to one journal image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageState {
    Before,
    After,
    Diverged,
}

fn classify<T: PartialEq>(current: Option<&T>, before: &T, after: &T) -> ImageState {
    match current {
        Some(doc) if doc == after => ImageState::After,
        Some(doc) if doc == before => ImageState::Before,
        _ => ImageState::Diverged,
    }
}

/// Result of rolling back one dead record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    RolledBack { restored: usize },
    Conflict,
}

/// Before and after state of one document touched by a commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentImage {
    Task { before: Task, after: Task },
    Account { before: Account, after: Account },
}

impl DocumentImage {
    pub fn task(before: Task, after: Task) -> Self {
        DocumentImage::Task { before, after }
    }

    pub fn account(before: Account, after: Account) -> Self {
        DocumentImage::Account { before, after }
    }

    fn lock_path(&self, storage: &Storage) -> PathBuf {
        match self {
            DocumentImage::Task { before, .. } => storage.task_lock(&before.id),
            DocumentImage::Account { before, .. } => storage.account_lock(&before.id),
        }
    }

    fn write_after(&self, storage: &Storage) -> Result<()> {
        match self {
            DocumentImage::Task { after, .. } => {
                storage.write_json(&storage.task_file(&after.id), after)
            }
            DocumentImage::Account { after, .. } => {
                storage.write_json(&storage.account_file(&after.id), after)
            }
        }
    }

    fn state(&self, storage: &Storage) -> Result<ImageState> {
        match self {
            DocumentImage::Task { before, after } => {
                let current: Option<Task> = storage.read_json_opt(&storage.task_file(&before.id))?;
                Ok(classify(current.as_ref(), before, after))
            }
            DocumentImage::Account { before, after } => {
                let current: Option<Account> =
                    storage.read_json_opt(&storage.account_file(&before.id))?;
                Ok(classify(current.as_ref(), before, after))
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            DocumentImage::Task { before, .. } => format!("task {}", before.id),
            DocumentImage::Account { before, .. } => format!("account {}", before.id),
        }
    }

    fn restore_before(&self, storage: &Storage) -> Result<()> {
        match self {
            DocumentImage::Task { before, .. } => {
                storage.write_json(&storage.task_file(&before.id), before)
            }
            DocumentImage::Account { before, .. } => {
                storage.write_json(&storage.account_file(&before.id), before)
            }
        }
    }
}

/// Journal record for one in-flight commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub txn_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub task_id: String,
    pub user_id: String,
    /// Documents in write order
    pub images: Vec<DocumentImage>,
}

impl JournalRecord {
    pub fn new(
        task_id: impl Into<String>,
        user_id: impl Into<String>,
        images: Vec<DocumentImage>,
    ) -> Self {
        Self {
            txn_id: Uuid::new_v4(),
            started_at: Utc::now(),
            task_id: task_id.into(),
            user_id: user_id.into(),
            images,
        }
    }

    pub fn lock_paths(&self, storage: &Storage) -> Vec<PathBuf> {
        self.images
            .iter()
            .map(|image| image.lock_path(storage))
            .collect()
    }
}

/// Summary of a recovery pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    pub rolled_back: Vec<Uuid>,
    pub restored_documents: usize,
    /// Records whose locks could not be taken; they stay for the next pass
    pub skipped: usize,
    /// Records kept because a document matches neither of its images
    pub conflicts: Vec<Uuid>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.rolled_back.is_empty() && self.skipped == 0 && self.conflicts.is_empty()
    }

    /// Combine with a later pass; `skipped` and `conflicts` reflect only the later one.
    pub fn merge(mut self, later: RecoveryReport) -> Self {
        self.rolled_back.extend(later.rolled_back);
        self.restored_documents += later.restored_documents;
        self.skipped = later.skipped;
        self.conflicts = later.conflicts;
        self
    }
}

/// Journal manager
#[derive(Debug, Clone)]
pub struct Journal {
    storage: Storage,
}

impl Journal {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    fn record_path(&self, txn_id: &Uuid) -> PathBuf {
        self.storage.journal_file(&txn_id.to_string())
    }

    /// Write every after-image of `record` as one unit.
    ///
    /// The caller must hold the entity locks for all images. On error no
    /// document is left changed, unless the rollback itself fails, in which
    /// case the record stays behind for [`Journal::recover`] or the next
    /// [`Journal::lock_settled`] on its entities.
    pub fn apply(&self, record: &JournalRecord) -> Result<()> {
        let path = self.record_path(&record.txn_id);
        self.storage.write_json(&path, record)?;
        debug!(txn_id = %record.txn_id, task_id = %record.task_id, "journal record written");

        for (written, image) in record.images.iter().enumerate() {
            if let Err(err) = image.write_after(&self.storage) {
                self.rollback(record, &record.images[..written]);
                return Err(err);
            }
        }

        if let Err(err) = self.storage.remove(&path) {
            self.rollback(record, &record.images);
            return Err(err);
        }
        debug!(txn_id = %record.txn_id, "journal record committed");
        Ok(())
    }

    /// Records left by commits that never reached the commit point
    pub fn pending(&self) -> Result<Vec<JournalRecord>> {
        let mut records: Vec<JournalRecord> =
            self.storage.read_dir_json(&self.storage.journal_dir())?;
        records.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(records)
    }

    pub fn has_pending(&self) -> Result<bool> {
        Ok(!self
            .storage
            .list_json_paths(&self.storage.journal_dir())?
            .is_empty())
    }

    /// Roll back every leftover record to its before-images.
    pub fn recover(&self, lock_timeout_ms: u64) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for record in self.pending()? {
            let _locks = match LockSet::acquire(record.lock_paths(&self.storage), lock_timeout_ms)
            {
                Ok(locks) => locks,
                Err(Error::LockFailed(path)) => {
                    warn!(txn_id = %record.txn_id, lock = %path.display(), "journal recovery skipped");
                    report.skipped += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };

            // A live commit removes its record before releasing its locks.
            let path = self.record_path(&record.txn_id);
            if self.storage.read_json_opt::<JournalRecord>(&path)?.is_none() {
                continue;
            }

            match self.settle(&record)? {
                Settlement::RolledBack { restored } => {
                    info!(
                        txn_id = %record.txn_id,
                        task_id = %record.task_id,
                        user_id = %record.user_id,
                        restored,
                        "rolled back interrupted commit"
                    );
                    report.restored_documents += restored;
                    report.rolled_back.push(record.txn_id);
                }
                Settlement::Conflict => report.conflicts.push(record.txn_id),
            }
        }

        Ok(report)
    }

    /// Lock `paths` for a mutation, rolling back dead records on them first.
    ///
    /// A commit keeps its locks until its record is removed or abandoned, so
    /// a record naming a lock held here belongs to a commit that failed or
    /// crashed. The lock set is widened to every entity such a record names
    /// before it is rolled back.
    pub fn lock_settled(&self, paths: Vec<PathBuf>, timeout_ms: u64) -> Result<LockSet> {
        let mut wanted = paths;

        for _ in 0..MAX_SETTLE_ROUNDS {
            let locks = LockSet::acquire(wanted.clone(), timeout_ms)?;
            let touching: Vec<JournalRecord> = self
                .pending()?
                .into_iter()
                .filter(|record| {
                    record
                        .lock_paths(&self.storage)
                        .iter()
                        .any(|path| locks.holds(path))
                })
                .collect();
            let missing: Vec<PathBuf> = touching
                .iter()
                .flat_map(|record| record.lock_paths(&self.storage))
                .filter(|path| !locks.holds(path))
                .collect();

            if missing.is_empty() {
                for record in &touching {
                    match self.settle(record)? {
                        Settlement::RolledBack { restored } => {
                            info!(txn_id = %record.txn_id, restored, "rolled back abandoned commit");
                        }
                        Settlement::Conflict => {
                            return Err(Error::JournalConflict {
                                txn_id: record.txn_id.to_string(),
                            });
                        }
                    }
                }
                return Ok(locks);
            }

            debug!(extra = missing.len(), "widening lock set to settle journal records");
            wanted.extend(missing);
        }

        Err(Error::LockFailed(self.storage.journal_dir()))
    }

    /// Roll a dead record back. The caller holds every lock it names.
    ///
    /// Documents at their after-image get the before-image back; documents
    /// already at their before-image are left alone. If any document matches
    /// neither, nothing is written and the record is kept.
    fn settle(&self, record: &JournalRecord) -> Result<Settlement> {
        let mut states = Vec::with_capacity(record.images.len());
        for image in &record.images {
            let state = image.state(&self.storage)?;
            if state == ImageState::Diverged {
                warn!(
                    txn_id = %record.txn_id,
                    document = %image.describe(),
                    "journal record conflicts with stored document"
                );
                return Ok(Settlement::Conflict);
            }
            states.push(state);
        }

        let mut restored = 0;
        for (image, state) in record.images.iter().zip(&states).rev() {
            if *state == ImageState::After {
                image.restore_before(&self.storage)?;
                restored += 1;
            }
        }
        self.storage.remove(&self.record_path(&record.txn_id))?;
        Ok(Settlement::RolledBack { restored })
    }

    fn rollback(&self, record: &JournalRecord, written: &[DocumentImage]) {
        for image in written.iter().rev() {
            if let Err(err) = image.restore_before(&self.storage) {
                warn!(txn_id = %record.txn_id, error = %err, "rollback incomplete; record kept for recovery");
                return;
            }
        }
        if let Err(err) = self.storage.remove(&self.record_path(&record.txn_id)) {
            warn!(txn_id = %record.txn_id, error = %err, "journal record not removed after rollback");
            return;
        }
        debug!(txn_id = %record.txn_id, restored = written.len(), "commit rolled back");
    }
}
