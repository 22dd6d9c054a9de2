//! Ledger facade
//!
//! Wires the stores, the completion engine and the read view over one data
//! directory. Opening a ledger rolls back any commit a crashed process left
//! behind.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::{debug, info};

use crate::account::{Account, AccountStore};
use crate::config::Config;
use crate::engine::{CompletionEngine, CompletionReceipt};
use crate::error::{Error, Result};
use crate::journal::{Journal, RecoveryReport};
use crate::storage::Storage;
use crate::task::{NewTask, Task, TaskStore};
use crate::view::{self, UserView};

/// Environment variable naming the data directory
pub const DATA_DIR_ENV: &str = "TALLY_DATA_DIR";

/// Resolve the data directory.
///
/// Order: explicit path, then `TALLY_DATA_DIR`, then the platform data dir.
pub fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Ok(raw) = std::env::var(DATA_DIR_ENV) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }

    ProjectDirs::from("", "", "tally")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "no data directory: pass --data-dir or set {DATA_DIR_ENV}"
            ))
        })
}

/// Result of initializing a data directory
#[derive(Debug, Clone, serde::Serialize)]
pub struct InitReport {
    pub data_dir: PathBuf,
    pub created_config: bool,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    storage: Storage,
    config: Config,
    tasks: TaskStore,
    accounts: AccountStore,
    engine: CompletionEngine,
    journal: Journal,
    opened_with: RecoveryReport,
}

impl Ledger {
    /// Create the directory layout and a default `tally.toml` if missing.
    pub fn init(data_dir: &Path) -> Result<InitReport> {
        let storage = Storage::new(data_dir);
        storage.init()?;

        let config_path = storage.config_file();
        let created_config = !config_path.exists();
        if created_config {
            Config::default().save(&config_path)?;
        } else {
            Config::load(&config_path)?;
        }

        info!(data_dir = %data_dir.display(), created_config, "data directory initialized");
        Ok(InitReport {
            data_dir: data_dir.to_path_buf(),
            created_config,
        })
    }

    /// Open the ledger in `data_dir`, loading `tally.toml` when present.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let config = Config::load_from_dir(data_dir)?;
        Self::open_with(Storage::new(data_dir), config)
    }

    /// Open over an explicit storage handle and configuration.
    pub fn open_with(storage: Storage, config: Config) -> Result<Self> {
        config.validate()?;
        storage.init()?;

        let timeout = config.engine.lock_timeout_ms;
        let tasks = TaskStore::new(storage.clone(), config.ledger.default_task_points, timeout);
        let accounts = AccountStore::new(storage.clone(), config.ledger.signup_bonus, timeout);
        let engine = CompletionEngine::new(storage.clone(), tasks.clone(), accounts.clone(), &config);
        let journal = Journal::new(storage.clone());

        let mut ledger = Self {
            storage,
            config,
            tasks,
            accounts,
            engine,
            journal,
            opened_with: RecoveryReport::default(),
        };

        let report = ledger.recover()?;
        if !report.is_clean() {
            info!(
                rolled_back = report.rolled_back.len(),
                skipped = report.skipped,
                conflicts = report.conflicts.len(),
                "recovered interrupted commits on open"
            );
        }
        ledger.opened_with = report;
        debug!(data_dir = %ledger.storage.root().display(), "ledger opened");
        Ok(ledger)
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// What the recovery pass run by [`Ledger::open_with`] did
    pub fn recovery_on_open(&self) -> &RecoveryReport {
        &self.opened_with
    }

    // =========================================================================
    // Accounts
    // =========================================================================

    pub fn open_account(&self, user_id: &str) -> Result<Account> {
        self.accounts.open(user_id)
    }

    pub fn account(&self, user_id: &str) -> Result<Account> {
        self.accounts.get(user_id)
    }

    pub fn get_balance(&self, user_id: &str) -> Result<i64> {
        self.accounts.get_balance(user_id)
    }

    /// Administrative credit or debit; the balance may go negative.
    pub fn adjust_balance(&self, user_id: &str, delta: i64, admin: bool) -> Result<i64> {
        require_admin(admin, "adjusting a balance")?;
        self.accounts.adjust_balance(user_id, delta)
    }

    /// Administrative balance override
    pub fn set_balance(&self, user_id: &str, points: i64, admin: bool) -> Result<Account> {
        require_admin(admin, "setting a balance")?;
        self.accounts.set_balance(user_id, points)
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        self.accounts.list()
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    pub fn create_task(&self, request: NewTask) -> Result<Task> {
        self.accounts.get(&request.creator_id)?;
        self.tasks.create(request)
    }

    pub fn task(&self, task_id: &str) -> Result<Task> {
        self.tasks.get(task_id)
    }

    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        self.tasks.list_all()
    }

    /// Soft-delete a task. Without `admin`, only the creator may delete it.
    pub fn soft_delete_task(&self, task_id: &str, caller_id: &str, admin: bool) -> Result<Task> {
        if !admin {
            let task = self.tasks.get(task_id)?;
            if task.creator_id != caller_id {
                return Err(Error::Forbidden(format!(
                    "task {task_id} belongs to another user"
                )));
            }
        }
        self.tasks.soft_delete(task_id)
    }

    // =========================================================================
    // Completion and views
    // =========================================================================

    pub fn complete_task(&self, task_id: &str, user_id: &str) -> Result<CompletionReceipt> {
        self.engine.complete_task(task_id, user_id)
    }

    pub fn get_user_view(&self, user_id: &str) -> Result<UserView> {
        view::get_user_view(&self.tasks, &self.accounts, user_id)
    }

    /// Roll back commits interrupted by a crash
    pub fn recover(&self) -> Result<RecoveryReport> {
        self.journal.recover(self.config.engine.lock_timeout_ms)
    }
}

fn require_admin(admin: bool, what: &str) -> Result<()> {
    if admin {
        Ok(())
    } else {
        Err(Error::Forbidden(format!("{what} requires --admin")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Action, Platform};
    use tempfile::TempDir;

    fn request(creator: &str, link: &str) -> NewTask {
        NewTask {
            creator_id: creator.to_string(),
            platform: Platform::Facebook,
            action: Action::Like,
            link: link.to_string(),
            points: None,
        }
    }

    #[test]
    fn init_writes_default_config_once() {
        let dir = TempDir::new().unwrap();
        let first = Ledger::init(dir.path()).unwrap();
        assert!(first.created_config);
        assert!(dir.path().join("tally.toml").exists());

        let second = Ledger::init(dir.path()).unwrap();
        assert!(!second.created_config);
    }

    #[test]
    fn open_reads_config_from_data_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tally.toml"), "[ledger]\nsignup_bonus = 10\n").unwrap();

        let ledger = Ledger::open(dir.path()).unwrap();
        assert_eq!(ledger.open_account("alice").unwrap().points, 10);
    }

    #[test]
    fn create_requires_creator_account() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path()).unwrap();

        let err = ledger
            .create_task(request("ghost", "https://facebook.com/page"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn only_creator_or_admin_can_delete() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path()).unwrap();
        ledger.open_account("alice").unwrap();
        ledger.open_account("bob").unwrap();
        let task = ledger
            .create_task(request("alice", "https://facebook.com/page"))
            .unwrap();

        assert!(matches!(
            ledger.soft_delete_task(&task.id, "bob", false),
            Err(Error::Forbidden(_))
        ));
        assert!(ledger.task(&task.id).unwrap().is_active);

        let deleted = ledger.soft_delete_task(&task.id, "bob", true).unwrap();
        assert!(!deleted.is_active);
        assert!(ledger.soft_delete_task(&task.id, "alice", false).is_ok());
    }

    #[test]
    fn balance_overrides_require_admin() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(dir.path()).unwrap();
        ledger.open_account("alice").unwrap();

        assert!(matches!(
            ledger.set_balance("alice", 500, false),
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            ledger.adjust_balance("alice", 10, false),
            Err(Error::Forbidden(_))
        ));
        assert_eq!(ledger.get_balance("alice").unwrap(), 50);

        assert_eq!(ledger.set_balance("alice", 5, true).unwrap().points, 5);
        assert_eq!(ledger.adjust_balance("alice", -7, true).unwrap(), -2);
    }

    #[test]
    fn explicit_data_dir_wins() {
        let path = Path::new("/tmp/tally-explicit");
        assert_eq!(resolve_data_dir(Some(path)).unwrap(), path);
    }
}
