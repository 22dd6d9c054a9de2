//! Account store for tally.
//!
//! One JSON document per user under `accounts/`. Balances are signed and may
//! go negative when a creator funds more completions than they hold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::journal::Journal;
use crate::lock::FileLock;
use crate::storage::{is_valid_entity_id, Storage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub points: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Copy with `delta` applied to the balance
    pub fn adjusted(&self, delta: i64) -> Result<Account> {
        let points = self.points.checked_add(delta).ok_or_else(|| {
            Error::Validation(format!(
                "balance overflow for {}: {} + {}",
                self.id, self.points, delta
            ))
        })?;
        Ok(Account {
            points,
            updated_at: Utc::now(),
            ..self.clone()
        })
    }
}

pub fn check_user_id(user_id: &str) -> Result<()> {
    if is_valid_entity_id(user_id) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "invalid user id '{user_id}': use letters, digits, '-', '_' or '.'"
        )))
    }
}

#[derive(Debug, Clone)]
pub struct AccountStore {
    storage: Storage,
    journal: Journal,
    signup_bonus: i64,
    lock_timeout_ms: u64,
}

impl AccountStore {
    pub fn new(storage: Storage, signup_bonus: i64, lock_timeout_ms: u64) -> Self {
        Self {
            journal: Journal::new(storage.clone()),
            storage,
            signup_bonus,
            lock_timeout_ms,
        }
    }

    /// Open an account with the signup bonus; an existing account is returned as is.
    pub fn open(&self, user_id: &str) -> Result<Account> {
        check_user_id(user_id)?;
        let _lock = FileLock::acquire(self.storage.account_lock(user_id), self.lock_timeout_ms)?;
        if let Some(existing) = self.find(user_id)? {
            return Ok(existing);
        }

        let now = Utc::now();
        let account = Account {
            id: user_id.to_string(),
            points: self.signup_bonus,
            created_at: now,
            updated_at: now,
        };
        self.write(&account)?;
        info!(user_id, points = account.points, "account opened");
        Ok(account)
    }

    pub fn find(&self, user_id: &str) -> Result<Option<Account>> {
        if !is_valid_entity_id(user_id) {
            return Ok(None);
        }
        self.storage
            .read_json_opt(&self.storage.account_file(user_id))
    }

    pub fn get(&self, user_id: &str) -> Result<Account> {
        self.find(user_id)?
            .ok_or_else(|| Error::NotFound(format!("account {user_id}")))
    }

    pub fn get_balance(&self, user_id: &str) -> Result<i64> {
        Ok(self.get(user_id)?.points)
    }

    /// Apply `delta` under the account lock and return the new balance.
    pub fn adjust_balance(&self, user_id: &str, delta: i64) -> Result<i64> {
        self.update(user_id, |account| account.adjusted(delta))
            .map(|account| account.points)
    }

    /// Administrative override of a balance
    pub fn set_balance(&self, user_id: &str, points: i64) -> Result<Account> {
        if points < 0 {
            return Err(Error::Validation(
                "points cannot be negative".to_string(),
            ));
        }
        let account = self.update(user_id, |account| {
            Ok(Account {
                points,
                updated_at: Utc::now(),
                ..account.clone()
            })
        })?;
        info!(user_id, points, "balance set by administrator");
        Ok(account)
    }

    /// Every account, newest first
    pub fn list(&self) -> Result<Vec<Account>> {
        let mut accounts: Vec<Account> =
            self.storage.read_dir_json(&self.storage.accounts_dir())?;
        accounts.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        Ok(accounts)
    }

    pub(crate) fn write(&self, account: &Account) -> Result<()> {
        self.storage
            .write_json(&self.storage.account_file(&account.id), account)
    }

    fn update<F>(&self, user_id: &str, change: F) -> Result<Account>
    where
        F: FnOnce(&Account) -> Result<Account>,
    {
        if !is_valid_entity_id(user_id) {
            return Err(Error::NotFound(format!("account {user_id}")));
        }
        let _locks = self
            .journal
            .lock_settled(vec![self.storage.account_lock(user_id)], self.lock_timeout_ms)?;
        let current = self.get(user_id)?;
        let next = change(&current)?;
        self.write(&next)?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    fn store() -> (TempDir, AccountStore) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        storage.init().unwrap();
        (dir, AccountStore::new(storage, 50, 5000))
    }

    #[test]
    fn open_grants_signup_bonus_once() {
        let (_dir, store) = store();
        let first = store.open("alice").unwrap();
        assert_eq!(first.points, 50);

        store.adjust_balance("alice", -10).unwrap();
        let again = store.open("alice").unwrap();
        assert_eq!(again.points, 40);
        assert_eq!(again.created_at, first.created_at);
    }

    #[test]
    fn open_rejects_unsafe_ids() {
        let (_dir, store) = store();
        assert!(matches!(store.open("../bob"), Err(Error::Validation(_))));
        assert!(matches!(store.open(""), Err(Error::Validation(_))));
    }

    #[test]
    fn missing_account_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(store.get_balance("ghost"), Err(Error::NotFound(_))));
        assert!(matches!(store.adjust_balance("ghost", 1), Err(Error::NotFound(_))));
    }

    #[test]
    fn adjust_balance_can_go_negative() {
        let (_dir, store) = store();
        store.open("alice").unwrap();
        assert_eq!(store.adjust_balance("alice", -60).unwrap(), -10);
        assert_eq!(store.get_balance("alice").unwrap(), -10);
    }

    #[test]
    fn adjust_balance_overflow_is_validation() {
        let (_dir, store) = store();
        store.open("alice").unwrap();
        store.set_balance("alice", i64::MAX).unwrap();
        assert!(matches!(store.adjust_balance("alice", 1), Err(Error::Validation(_))));
        assert_eq!(store.get_balance("alice").unwrap(), i64::MAX);
    }

    #[test]
    fn set_balance_rejects_negative() {
        let (_dir, store) = store();
        store.open("alice").unwrap();
        assert!(matches!(store.set_balance("alice", -1), Err(Error::Validation(_))));
        assert_eq!(store.set_balance("alice", 7).unwrap().points, 7);
    }

    #[test]
    fn concurrent_adjustments_are_not_lost() {
        let (_dir, store) = store();
        store.open("alice").unwrap();

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let mut handles = Vec::with_capacity(threads);
        for _ in 0..threads {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                for _ in 0..5 {
                    store.adjust_balance("alice", 1).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get_balance("alice").unwrap(), 50 + 40);
    }

    #[test]
    fn list_returns_every_account() {
        let (_dir, store) = store();
        store.open("alice").unwrap();
        store.open("bob").unwrap();
        let mut ids: Vec<String> = store.list().unwrap().into_iter().map(|a| a.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["alice", "bob"]);
    }
}
