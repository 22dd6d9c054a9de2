//! Concurrent batch execution
//!
//! Runs a list of ledger requests at once, one blocking worker per request on
//! a multi-threaded tokio runtime. Outcomes come back in input order. The
//! ledger's entity locks are what keep concurrent requests consistent.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::CompletionReceipt;
use crate::error::{Error, JsonError, Result};
use crate::ledger::Ledger;
use crate::task::{NewTask, Task};

/// One line of a batch file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BatchRequest {
    Complete {
        task_id: String,
        user_id: String,
    },
    Create(NewTask),
    Delete {
        task_id: String,
        user_id: String,
        #[serde(default)]
        admin: bool,
    },
}

impl BatchRequest {
    pub fn op(&self) -> &'static str {
        match self {
            BatchRequest::Complete { .. } => "complete",
            BatchRequest::Create(_) => "create",
            BatchRequest::Delete { .. } => "delete",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Completed { receipt: CompletionReceipt },
    Created { task: Task },
    Deleted { task: Task },
    Failed { error: JsonError },
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, BatchOutcome::Failed { .. })
    }

    fn from_result<T>(result: Result<T>, wrap: impl FnOnce(T) -> BatchOutcome) -> Self {
        match result {
            Ok(value) => wrap(value),
            Err(err) => BatchOutcome::Failed {
                error: JsonError::from(&err),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub index: usize,
    pub op: &'static str,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

/// Parse a JSON-lines batch; blank lines and `#` comments are skipped.
pub fn parse_batch(input: &str) -> Result<Vec<BatchRequest>> {
    let mut requests = Vec::new();
    for (line_no, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let request = serde_json::from_str(line).map_err(|err| {
            Error::InvalidArgument(format!("batch line {}: {err}", line_no + 1))
        })?;
        requests.push(request);
    }
    Ok(requests)
}

/// Run every request concurrently and wait for all of them.
pub fn run_batch(ledger: &Ledger, requests: Vec<BatchRequest>) -> Result<Vec<BatchResult>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_batch_async(Arc::new(ledger.clone()), requests))
}

pub async fn run_batch_async(
    ledger: Arc<Ledger>,
    requests: Vec<BatchRequest>,
) -> Result<Vec<BatchResult>> {
    let handles: Vec<_> = requests
        .into_iter()
        .enumerate()
        .map(|(index, request)| {
            let ledger = Arc::clone(&ledger);
            let op = request.op();
            let handle = tokio::task::spawn_blocking(move || execute(&ledger, request));
            (index, op, handle)
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (index, op, handle) in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(index, op, error = %err, "batch worker did not finish");
                BatchOutcome::Failed {
                    error: JsonError::from(&Error::OperationFailed(format!(
                        "batch worker {index} failed: {err}"
                    ))),
                }
            }
        };
        results.push(BatchResult { index, op, outcome });
    }

    debug!(
        total = results.len(),
        failed = results.iter().filter(|r| !r.outcome.is_success()).count(),
        "batch finished"
    );
    Ok(results)
}

fn execute(ledger: &Ledger, request: BatchRequest) -> BatchOutcome {
    match request {
        BatchRequest::Complete { task_id, user_id } => BatchOutcome::from_result(
            ledger.complete_task(&task_id, &user_id),
            |receipt| BatchOutcome::Completed { receipt },
        ),
        BatchRequest::Create(new_task) => {
            BatchOutcome::from_result(ledger.create_task(new_task), |task| {
                BatchOutcome::Created { task }
            })
        }
        BatchRequest::Delete {
            task_id,
            user_id,
            admin,
        } => BatchOutcome::from_result(
            ledger.soft_delete_task(&task_id, &user_id, admin),
            |task| BatchOutcome::Deleted { task },
        ),
    }
}
