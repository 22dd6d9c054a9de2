#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use tally::config::Config;
use tally::platform::{Action, Platform};
use tally::storage::{FaultInjector, Storage};
use tally::task::{NewTask, Task};
use tally::Ledger;
use tempfile::TempDir;

pub struct TestLedger {
    dir: TempDir,
    pub ledger: Ledger,
}

impl TestLedger {
    pub fn open() -> Self {
        Self::open_with(Config::default())
    }

    pub fn open_with(config: Config) -> Self {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let ledger = Ledger::open_with(Storage::new(dir.path()), config).expect("open ledger");
        Self { dir, ledger }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn storage(&self) -> Storage {
        Storage::new(self.dir.path())
    }

    /// A second handle on the same data dir whose writes go through `faults`
    pub fn faulty(&self, faults: Arc<FaultInjector>, config: Config) -> Ledger {
        Ledger::open_with(self.storage().with_faults(faults), config).expect("open faulty ledger")
    }

    pub fn users(&self, ids: &[&str]) {
        for id in ids {
            self.ledger.open_account(id).expect("open account");
        }
    }

    pub fn post(&self, creator: &str, link: &str, points: u32) -> Task {
        self.ledger
            .create_task(youtube_like(creator, link, Some(points)))
            .expect("create task")
    }

    pub fn balance(&self, user: &str) -> i64 {
        self.ledger.get_balance(user).expect("balance")
    }
}

pub fn youtube_like(creator: &str, link: &str, points: Option<u32>) -> NewTask {
    NewTask {
        creator_id: creator.to_string(),
        platform: Platform::YouTube,
        action: Action::Like,
        link: link.to_string(),
        points,
    }
}
