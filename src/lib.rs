//! tally - Task-Completion Reward Ledger Library
//!
//! Users post social-media engagement tasks; other users complete them and
//! points move from the task's creator to the completer. Each (task, user)
//! pair pays out exactly once, even under concurrent access or a crash in the
//! middle of a commit.
//!
//! # Core Concepts
//!
//! - **Tasks**: a link plus a platform/action pair and a reward, with embedded completions
//! - **Accounts**: signed point balances, opened with a signup bonus
//! - **Completion engine**: locked, journaled all-or-nothing transfer
//! - **Journal**: before/after images that roll back interrupted commits
//!
//! # Module Organization
//!
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `tally.toml`
//! - `error`: Error types and result aliases
//! - `lock`: File locking and atomic writes for concurrency safety
//! - `storage`: Data directory layout and JSON document IO
//! - `platform` / `link`: Platform vocabulary, link normalization and validation
//! - `task` / `account`: Task and account stores
//! - `journal` / `engine`: Commit journal and completion transaction engine
//! - `view`: Per-user read view
//! - `ledger`: Facade over one data directory
//! - `dispatch`: Concurrent batch execution on tokio
//! - `identity`: Acting user resolution
//! - `output`: JSON envelope and human output

pub mod account;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod identity;
pub mod journal;
pub mod ledger;
pub mod link;
pub mod lock;
pub mod output;
pub mod platform;
pub mod storage;
pub mod task;
pub mod view;

pub use engine::CompletionReceipt;
pub use error::{Error, Result};
pub use ledger::Ledger;
