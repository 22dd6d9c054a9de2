//! Command-line interface for tally
//!
//! This module defines the CLI structure using clap derive macros.
//! Each command group is implemented in its own submodule.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::Result;
use crate::identity;
use crate::ledger::{self, Ledger};
use crate::output::OutputOptions;

mod account;
mod batch;
mod init;
mod recover;
mod task;
mod view;

/// tally - task-completion reward ledger
///
/// Users post engagement tasks, other users complete them, and points move
/// from the creator to the completer exactly once per user and task.
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Data directory (defaults to the platform data directory)
    #[arg(long, global = true, env = "TALLY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Acting user id
    #[arg(long, global = true, env = "TALLY_USER")]
    pub user: Option<String>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory and a default tally.toml
    Init,

    /// Task management
    #[command(subcommand)]
    Task(TaskCommands),

    /// Account management
    #[command(subcommand)]
    Account(AccountCommands),

    /// Show available tasks, own tasks and balance for the acting user
    View,

    /// Roll back commits interrupted by a crash
    Recover,

    /// Run a JSON-lines file of requests concurrently
    Batch {
        /// Batch file, one request per line ("-" for stdin)
        file: PathBuf,
    },
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// Post a new task as the acting user
    Create {
        /// YouTube, Instagram or Facebook
        #[arg(long)]
        platform: String,

        /// Like, Subscribe or Follow
        #[arg(long)]
        action: String,

        /// Link to the post, channel or page
        #[arg(long)]
        link: String,

        /// Reward per completion (defaults to ledger.default_task_points)
        #[arg(long)]
        points: Option<u32>,
    },

    /// Complete a task as the acting user
    Complete {
        /// Task ID
        id: String,
    },

    /// Soft-delete a task
    Rm {
        /// Task ID
        id: String,

        /// Delete regardless of ownership
        #[arg(long)]
        admin: bool,
    },

    /// Show one task with its completions
    Show {
        /// Task ID
        id: String,
    },

    /// List tasks (all by default)
    List {
        /// Only tasks the acting user can complete
        #[arg(long, conflicts_with = "own")]
        available: bool,

        /// Only tasks posted by the acting user
        #[arg(long)]
        own: bool,
    },
}

/// Account subcommands
#[derive(Subcommand, Debug)]
pub enum AccountCommands {
    /// Open an account with the signup bonus
    Open {
        /// User id (defaults to the acting user)
        id: Option<String>,
    },

    /// Show an account
    Show {
        /// User id (defaults to the acting user)
        id: Option<String>,
    },

    /// Override a balance (administrative)
    Set {
        /// User id
        id: String,

        /// New balance
        #[arg(allow_negative_numbers = true)]
        points: i64,

        /// Required; balance overrides are administrative
        #[arg(long)]
        admin: bool,
    },

    /// Credit or debit a balance (administrative)
    Adjust {
        /// User id
        id: String,

        /// Points to add; negative to debit
        #[arg(allow_negative_numbers = true)]
        delta: i64,

        /// Required; balance adjustments are administrative
        #[arg(long)]
        admin: bool,
    },

    /// List all accounts
    List,
}

/// Resolved global flags shared by every command
#[derive(Debug, Clone)]
pub(crate) struct Context {
    data_dir: Option<PathBuf>,
    user: Option<String>,
    pub(crate) output: OutputOptions,
}

impl Context {
    pub(crate) fn data_dir(&self) -> Result<PathBuf> {
        ledger::resolve_data_dir(self.data_dir.as_deref())
    }

    pub(crate) fn open_ledger(&self) -> Result<Ledger> {
        Ledger::open(&self.data_dir()?)
    }

    pub(crate) fn user(&self) -> Result<String> {
        identity::resolve_user(self.user.as_deref())
    }

    /// Explicit id if given, otherwise the acting user
    pub(crate) fn user_or(&self, explicit: Option<String>) -> Result<String> {
        match explicit {
            Some(id) => identity::resolve_user(Some(&id)),
            None => self.user(),
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let ctx = Context {
            data_dir: self.data_dir,
            user: self.user,
            output: OutputOptions {
                json: self.json,
                quiet: self.quiet,
            },
        };

        match self.command {
            Commands::Init => init::run(&ctx),
            Commands::Task(cmd) => match cmd {
                TaskCommands::Create {
                    platform,
                    action,
                    link,
                    points,
                } => task::run_create(
                    &ctx,
                    task::CreateOptions {
                        platform,
                        action,
                        link,
                        points,
                    },
                ),
                TaskCommands::Complete { id } => task::run_complete(&ctx, &id),
                TaskCommands::Rm { id, admin } => task::run_rm(&ctx, &id, admin),
                TaskCommands::Show { id } => task::run_show(&ctx, &id),
                TaskCommands::List { available, own } => {
                    let filter = if available {
                        task::ListFilter::Available
                    } else if own {
                        task::ListFilter::Own
                    } else {
                        task::ListFilter::All
                    };
                    task::run_list(&ctx, filter)
                }
            },
            Commands::Account(cmd) => match cmd {
                AccountCommands::Open { id } => account::run_open(&ctx, id),
                AccountCommands::Show { id } => account::run_show(&ctx, id),
                AccountCommands::Set { id, points, admin } => {
                    account::run_set(&ctx, &id, points, admin)
                }
                AccountCommands::Adjust { id, delta, admin } => {
                    account::run_adjust(&ctx, &id, delta, admin)
                }
                AccountCommands::List => account::run_list(&ctx),
            },
            Commands::View => view::run(&ctx),
            Commands::Recover => recover::run(&ctx),
            Commands::Batch { file } => batch::run(&ctx, &file),
        }
    }
}
