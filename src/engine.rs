//! Completion transaction engine
//!
//! Moves a task's reward from its creator to a completer exactly once per
//! (task, user) pair. Each attempt goes through a small state machine:
//!
//! ```text
//! Requested -> Validated -> Committed
//! Requested -> Validated -> Aborted
//! Requested -> Rejected
//! ```
//!
//! Rule violations reject the attempt and are returned as is. Storage faults
//! abort it; aborted attempts are retried up to `engine.commit_retries` times
//! before a [`Error::Transaction`] is surfaced.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::account::AccountStore;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::journal::{DocumentImage, Journal, JournalRecord};
use crate::storage::{is_valid_entity_id, Storage};
use crate::task::TaskStore;

/// Outcome of a committed completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReceipt {
    pub task_id: String,
    pub user_id: String,
    pub points_earned: u32,
    pub new_balance: i64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionState {
    Requested,
    Validated,
    Committed,
    Aborted,
    Rejected,
}

impl CompletionState {
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionState::Requested => "requested",
            CompletionState::Validated => "validated",
            CompletionState::Committed => "committed",
            CompletionState::Aborted => "aborted",
            CompletionState::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CompletionState::Committed | CompletionState::Aborted | CompletionState::Rejected
        )
    }
}

impl fmt::Display for CompletionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single attempt, logged on every transition
struct Attempt<'a> {
    task_id: &'a str,
    user_id: &'a str,
    number: u32,
    state: CompletionState,
}

impl<'a> Attempt<'a> {
    fn start(task_id: &'a str, user_id: &'a str, number: u32) -> Self {
        debug!(task_id, user_id, attempt = number, state = "requested", "completion requested");
        Self {
            task_id,
            user_id,
            number,
            state: CompletionState::Requested,
        }
    }

    fn advance(&mut self, next: CompletionState) {
        debug_assert!(!self.state.is_terminal());
        debug!(
            task_id = self.task_id,
            user_id = self.user_id,
            attempt = self.number,
            from = %self.state,
            to = %next,
            "completion state changed"
        );
        self.state = next;
    }

    /// Record the terminal state an error leads to and pass the error on
    fn fail(&mut self, err: Error) -> Error {
        let next = if err.is_storage_fault() || matches!(err, Error::JournalConflict { .. }) {
            CompletionState::Aborted
        } else {
            CompletionState::Rejected
        };
        self.advance(next);
        err
    }
}

/// A validated commit, built while the entity locks are held
struct Prepared {
    record: JournalRecord,
    points_earned: u32,
    completed_at: DateTime<Utc>,
    credited_balance: i64,
}

#[derive(Debug, Clone)]
pub struct CompletionEngine {
    storage: Storage,
    tasks: TaskStore,
    accounts: AccountStore,
    journal: Journal,
    lock_timeout_ms: u64,
    commit_retries: u32,
    allow_negative_balance: bool,
}

impl CompletionEngine {
    pub fn new(storage: Storage, tasks: TaskStore, accounts: AccountStore, config: &Config) -> Self {
        Self {
            journal: Journal::new(storage.clone()),
            storage,
            tasks,
            accounts,
            lock_timeout_ms: config.engine.lock_timeout_ms,
            commit_retries: config.engine.commit_retries,
            allow_negative_balance: config.ledger.allow_negative_balance,
        }
    }

    /// Complete `task_id` as `user_id`, crediting them and debiting the creator.
    pub fn complete_task(&self, task_id: &str, user_id: &str) -> Result<CompletionReceipt> {
        let attempts = self.commit_retries + 1;

        for number in 1..=attempts {
            let mut attempt = Attempt::start(task_id, user_id, number);
            match self.run_attempt(&mut attempt) {
                Ok(receipt) => return Ok(receipt),
                Err(err) if err.is_storage_fault() => {
                    warn!(
                        task_id,
                        user_id,
                        attempt = number,
                        error = %err,
                        "completion attempt aborted"
                    );
                }
                Err(err) => {
                    debug!(task_id, user_id, attempt = number, kind = err.kind(), "completion rejected");
                    return Err(err);
                }
            }
        }

        Err(Error::Transaction {
            task_id: task_id.to_string(),
        })
    }

    fn run_attempt(&self, attempt: &mut Attempt<'_>) -> Result<CompletionReceipt> {
        let task_id = attempt.task_id;
        let user_id = attempt.user_id;

        // Unlocked pre-check so hopeless requests never touch a lock.
        let task = self.tasks.get(task_id).map_err(|err| attempt.fail(err))?;
        if let Err(err) = task.check_completable(user_id) {
            // A dead commit can leave this user's completion on the task;
            // only the locked check after settling is authoritative then.
            let settle_first = matches!(err, Error::AlreadyCompleted { .. })
                && self.journal.has_pending().map_err(|e| attempt.fail(e))?;
            if !settle_first {
                return Err(attempt.fail(err));
            }
        }
        if !is_valid_entity_id(user_id) {
            return Err(attempt.fail(Error::NotFound(format!("account {user_id}"))));
        }

        let _locks = self
            .journal
            .lock_settled(
                vec![
                    self.storage.task_lock(task_id),
                    self.storage.account_lock(user_id),
                    self.storage.account_lock(&task.creator_id),
                ],
                self.lock_timeout_ms,
            )
            .map_err(|err| attempt.fail(err))?;

        let prepared = self
            .prepare(task_id, user_id)
            .map_err(|err| attempt.fail(err))?;
        attempt.advance(CompletionState::Validated);

        self.journal
            .apply(&prepared.record)
            .map_err(|err| attempt.fail(err))?;
        attempt.advance(CompletionState::Committed);

        // Report what is stored; the lock is still held so nothing else moved it.
        let new_balance = match self.accounts.get(user_id) {
            Ok(account) => account.points,
            Err(err) => {
                warn!(task_id, user_id, error = %err, "balance re-read failed after commit");
                prepared.credited_balance
            }
        };

        info!(
            task_id,
            user_id,
            points = prepared.points_earned,
            new_balance,
            txn_id = %prepared.record.txn_id,
            "task completed"
        );
        Ok(CompletionReceipt {
            task_id: task_id.to_string(),
            user_id: user_id.to_string(),
            points_earned: prepared.points_earned,
            new_balance,
            completed_at: prepared.completed_at,
        })
    }

    /// Re-validate under the locks and build the commit record.
    fn prepare(&self, task_id: &str, user_id: &str) -> Result<Prepared> {
        let task = self.tasks.get(task_id)?;
        task.check_completable(user_id)?;

        let completer = self.accounts.get(user_id)?;
        let creator = self.accounts.get(&task.creator_id)?;

        let points = i64::from(task.points);
        let completed_at = Utc::now();
        let completed = task.with_completion(user_id, completed_at)?;
        let credited = completer.adjusted(points)?;
        let debited = creator.adjusted(-points)?;

        if !self.allow_negative_balance && debited.points < 0 {
            return Err(Error::InsufficientPoints {
                user_id: creator.id.clone(),
                balance: creator.points,
                required: task.points,
            });
        }

        Ok(Prepared {
            points_earned: task.points,
            completed_at,
            credited_balance: credited.points,
            record: JournalRecord::new(
                task_id,
                user_id,
                vec![
                    DocumentImage::task(task, completed),
                    DocumentImage::account(completer, credited),
                    DocumentImage::account(creator, debited),
                ],
            ),
        })
    }
}
