//! Task store for tally.
//!
//! Each task is one JSON document under `tasks/` that embeds its completion
//! records. Completions are append-only and hold at most one entry per user.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::link;
use crate::journal::Journal;
use crate::lock::FileLock;
use crate::platform::{Action, Platform};
use crate::storage::{is_valid_entity_id, Storage};

/// Record that a user performed a task once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub user_id: String,
    pub completed_at: DateTime<Utc>,
    /// Reward paid at completion time; later edits to the task's points do not touch it
    pub points_earned: u32,
}

/// Ordered completion records with a uniqueness index on `user_id`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Completion>", into = "Vec<Completion>")]
pub struct Completions {
    entries: Vec<Completion>,
    users: HashSet<String>,
}

impl Completions {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.users.contains(user_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Completion> {
        self.entries.iter()
    }

    pub fn get(&self, user_id: &str) -> Option<&Completion> {
        if !self.contains(user_id) {
            return None;
        }
        self.entries.iter().find(|entry| entry.user_id == user_id)
    }

    /// Append a completion; returns false if the user already has one.
    pub fn push(&mut self, completion: Completion) -> bool {
        if !self.users.insert(completion.user_id.clone()) {
            return false;
        }
        self.entries.push(completion);
        true
    }
}

impl TryFrom<Vec<Completion>> for Completions {
    type Error = String;

    fn try_from(entries: Vec<Completion>) -> std::result::Result<Self, Self::Error> {
        let mut completions = Completions::default();
        for entry in entries {
            let user_id = entry.user_id.clone();
            if !completions.push(entry) {
                return Err(format!("duplicate completion for user '{user_id}'"));
            }
        }
        Ok(completions)
    }
}

impl From<Completions> for Vec<Completion> {
    fn from(completions: Completions) -> Self {
        completions.entries
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub platform: Platform,
    pub action: Action,
    pub link: String,
    pub points: u32,
    pub creator_id: String,
    #[serde(default)]
    pub completions: Completions,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn has_completed(&self, user_id: &str) -> bool {
        self.completions.contains(user_id)
    }

    /// Active, not owned by the user, and not yet completed by them
    pub fn is_available_to(&self, user_id: &str) -> bool {
        self.is_active && self.creator_id != user_id && !self.has_completed(user_id)
    }

    /// Check whether `user_id` may complete this task right now.
    ///
    /// Order is fixed: activity, ownership, prior completion.
    pub fn check_completable(&self, user_id: &str) -> Result<()> {
        if !self.is_active {
            return Err(Error::NotFound(format!("task {} is no longer active", self.id)));
        }
        if self.creator_id == user_id {
            return Err(Error::SelfCompletion {
                task_id: self.id.clone(),
            });
        }
        if self.has_completed(user_id) {
            return Err(Error::AlreadyCompleted {
                task_id: self.id.clone(),
                user_id: user_id.to_string(),
            });
        }
        Ok(())
    }

    /// Copy of this task with a completion by `user_id` appended
    pub fn with_completion(&self, user_id: &str, completed_at: DateTime<Utc>) -> Result<Task> {
        self.check_completable(user_id)?;
        let mut next = self.clone();
        let appended = next.completions.push(Completion {
            user_id: user_id.to_string(),
            completed_at,
            points_earned: self.points,
        });
        debug_assert!(appended, "check_completable guards duplicates");
        Ok(next)
    }
}

/// Input for creating a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub creator_id: String,
    pub platform: Platform,
    pub action: Action,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
}

/// Order for the available-task listing: points desc, newest first, id.
pub fn sort_available(tasks: &mut [Task]) {
    tasks.sort_by(|left, right| {
        right
            .points
            .cmp(&left.points)
            .then_with(|| right.created_at.cmp(&left.created_at))
            .then_with(|| left.id.cmp(&right.id))
    });
}

fn newest_first(left: &Task, right: &Task) -> Ordering {
    right
        .created_at
        .cmp(&left.created_at)
        .then_with(|| left.id.cmp(&right.id))
}

#[derive(Debug, Clone)]
pub struct TaskStore {
    storage: Storage,
    journal: Journal,
    default_points: u32,
    lock_timeout_ms: u64,
}

impl TaskStore {
    pub fn new(storage: Storage, default_points: u32, lock_timeout_ms: u64) -> Self {
        Self {
            journal: Journal::new(storage.clone()),
            storage,
            default_points,
            lock_timeout_ms,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn generate_task_id() -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Create a task after validating the submission and link uniqueness.
    pub fn create(&self, request: NewTask) -> Result<Task> {
        let points = request.points.unwrap_or(self.default_points);
        if points == 0 {
            return Err(Error::Validation("points must be a positive integer".to_string()));
        }
        let canonical = link::check_submission(request.platform, request.action, &request.link)?;

        let _links = FileLock::acquire(self.storage.links_lock(), self.lock_timeout_ms)?;
        if let Some(existing) = self
            .list_all()?
            .into_iter()
            .find(|task| link::same_link(&task.link, &canonical))
        {
            debug!(task_id = %existing.id, link = %canonical, "duplicate link rejected");
            return Err(Error::Duplicate { link: canonical });
        }

        let task = Task {
            id: Self::generate_task_id(),
            platform: request.platform,
            action: request.action,
            link: canonical,
            points,
            creator_id: request.creator_id,
            completions: Completions::default(),
            is_active: true,
            created_at: Utc::now(),
            deleted_at: None,
        };
        self.write(&task)?;

        info!(
            task_id = %task.id,
            creator_id = %task.creator_id,
            platform = %task.platform,
            action = %task.action,
            points = task.points,
            "task created"
        );
        Ok(task)
    }

    pub fn find(&self, task_id: &str) -> Result<Option<Task>> {
        if !is_valid_entity_id(task_id) {
            return Ok(None);
        }
        self.storage.read_json_opt(&self.storage.task_file(task_id))
    }

    pub fn get(&self, task_id: &str) -> Result<Task> {
        self.find(task_id)?
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))
    }

    /// Every task, newest first
    pub fn list_all(&self) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self.storage.read_dir_json(&self.storage.tasks_dir())?;
        tasks.sort_by(newest_first);
        Ok(tasks)
    }

    /// Active tasks the user can still earn points from
    pub fn list_available(&self, user_id: &str) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .list_all()?
            .into_iter()
            .filter(|task| task.is_available_to(user_id))
            .collect();
        sort_available(&mut tasks);
        Ok(tasks)
    }

    /// Active tasks created by the user, newest first
    pub fn list_own(&self, user_id: &str) -> Result<Vec<Task>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|task| task.is_active && task.creator_id == user_id)
            .collect())
    }

    /// Mark a task inactive. Deleting an inactive task is a no-op.
    pub fn soft_delete(&self, task_id: &str) -> Result<Task> {
        if !is_valid_entity_id(task_id) {
            return Err(Error::NotFound(format!("task {task_id}")));
        }
        let _locks = self
            .journal
            .lock_settled(vec![self.storage.task_lock(task_id)], self.lock_timeout_ms)?;
        let mut task = self.get(task_id)?;
        if !task.is_active {
            return Ok(task);
        }

        task.is_active = false;
        task.deleted_at = Some(Utc::now());
        self.write(&task)?;
        info!(task_id = %task.id, "task soft-deleted");
        Ok(task)
    }

    pub(crate) fn write(&self, task: &Task) -> Result<()> {
        self.storage.write_json(&self.storage.task_file(&task.id), task)
    }
}
