//! Error types for tally
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad input, unknown task or account)
//! - 3: Rejected by a ledger rule (duplicate link, self-completion, already completed)
//! - 4: Operation failed (storage fault, aborted transaction, journal conflict)
//!
//! Every variant also maps to a stable machine-readable kind via [`Error::kind`].

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the tally CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const RULE_REJECTED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Stable error kinds reported to callers
pub mod kinds {
    pub const VALIDATION: &str = "validation_error";
    pub const NOT_FOUND: &str = "not_found";
    pub const DUPLICATE: &str = "duplicate_error";
    pub const SELF_COMPLETION: &str = "self_completion";
    pub const ALREADY_COMPLETED: &str = "already_completed";
    pub const INSUFFICIENT_POINTS: &str = "insufficient_points";
    pub const FORBIDDEN: &str = "forbidden";
    pub const TRANSACTION: &str = "transaction_error";
    pub const STORAGE: &str = "storage_error";
    pub const JOURNAL_CONFLICT: &str = "journal_conflict";
    pub const INTERNAL: &str = "internal_error";
}

/// Main error type for tally operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Rule rejections (exit code 3)
    #[error("A task with this link already exists: {link}")]
    Duplicate { link: String },

    #[error("You cannot complete your own task")]
    SelfCompletion { task_id: String },

    #[error("You have already completed this task")]
    AlreadyCompleted { task_id: String, user_id: String },

    #[error("Insufficient points: {user_id} has {balance}, needs {required}")]
    InsufficientPoints {
        user_id: String,
        balance: i64,
        required: u32,
    },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // Operation failures (exit code 4)
    #[error("Transaction failed while completing task {task_id}; no changes were applied")]
    Transaction { task_id: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Journal record {txn_id} no longer matches the stored documents; repair them and run `tally recover`")]
    JournalConflict { txn_id: String },
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation(_)
            | Error::InvalidArgument(_)
            | Error::InvalidConfig(_)
            | Error::NotFound(_) => exit_codes::USER_ERROR,

            Error::Duplicate { .. }
            | Error::SelfCompletion { .. }
            | Error::AlreadyCompleted { .. }
            | Error::InsufficientPoints { .. }
            | Error::Forbidden(_) => exit_codes::RULE_REJECTED,

            Error::Transaction { .. }
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_)
            | Error::OperationFailed(_)
            | Error::JournalConflict { .. } => exit_codes::OPERATION_FAILED,
        }
    }

    /// Stable machine-readable kind for this error
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) | Error::InvalidArgument(_) | Error::InvalidConfig(_) => {
                kinds::VALIDATION
            }
            Error::NotFound(_) => kinds::NOT_FOUND,
            Error::Duplicate { .. } => kinds::DUPLICATE,
            Error::SelfCompletion { .. } => kinds::SELF_COMPLETION,
            Error::AlreadyCompleted { .. } => kinds::ALREADY_COMPLETED,
            Error::InsufficientPoints { .. } => kinds::INSUFFICIENT_POINTS,
            Error::Forbidden(_) => kinds::FORBIDDEN,
            Error::Transaction { .. } => kinds::TRANSACTION,
            Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_) => kinds::STORAGE,
            Error::OperationFailed(_) => kinds::INTERNAL,
            Error::JournalConflict { .. } => kinds::JOURNAL_CONFLICT,
        }
    }

    /// Whether resubmitting the same request may succeed.
    ///
    /// A journal conflict needs a manual repair first.
    pub fn is_retryable(&self) -> bool {
        self.exit_code() == exit_codes::OPERATION_FAILED
            && !matches!(self, Error::JournalConflict { .. })
    }

    /// Storage-level faults that abort a commit attempt.
    pub(crate) fn is_storage_fault(&self) -> bool {
        self.kind() == kinds::STORAGE
    }

    /// Structured fields for JSON error output
    pub fn details(&self) -> Option<serde_json::Value> {
        use serde_json::json;

        match self {
            Error::Validation(message)
            | Error::InvalidArgument(message)
            | Error::InvalidConfig(message) => Some(json!({ "message": message })),
            Error::NotFound(what) => Some(json!({ "missing": what })),
            Error::Duplicate { link } => Some(json!({ "link": link })),
            Error::SelfCompletion { task_id } => Some(json!({ "task_id": task_id })),
            Error::AlreadyCompleted { task_id, user_id } => Some(json!({
                "task_id": task_id,
                "user_id": user_id,
            })),
            Error::InsufficientPoints {
                user_id,
                balance,
                required,
            } => Some(json!({
                "user_id": user_id,
                "balance": balance,
                "required": required,
            })),
            Error::Transaction { task_id } => Some(json!({
                "task_id": task_id,
                "retryable": true,
            })),
            Error::LockFailed(path) => Some(json!({ "lock": path.display().to_string() })),
            Error::JournalConflict { txn_id } => Some(json!({ "txn_id": txn_id })),
            _ => None,
        }
    }
}

/// Result type alias for tally operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub kind: &'static str,
    pub message: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            kind: err.kind(),
            message: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
