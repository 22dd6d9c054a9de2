//! tally batch command implementation.
//!
//! Each line of the input is one JSON request, e.g.
//! `{"op":"complete","task_id":"01h...","user_id":"bob"}`.

use std::io::Read;
use std::path::Path;

use crate::cli::Context;
use crate::dispatch::{self, BatchOutcome};
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};

pub fn run(ctx: &Context, file: &Path) -> Result<()> {
    let input = if file == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(file)?
    };
    let requests = dispatch::parse_batch(&input)?;

    let ledger = ctx.open_ledger()?;
    let results = dispatch::run_batch(&ledger, requests)?;

    let failed = results.iter().filter(|r| !r.outcome.is_success()).count();
    let mut human = HumanOutput::new(format!(
        "tally batch: {} request(s), {} failed",
        results.len(),
        failed
    ));
    for result in &results {
        let line = match &result.outcome {
            BatchOutcome::Completed { receipt } => format!(
                "#{} complete {}: +{} for {}",
                result.index, receipt.task_id, receipt.points_earned, receipt.user_id
            ),
            BatchOutcome::Created { task } => {
                format!("#{} create: {}", result.index, task.id)
            }
            BatchOutcome::Deleted { task } => {
                format!("#{} delete: {}", result.index, task.id)
            }
            BatchOutcome::Failed { error } => {
                format!("#{} {} failed: {}", result.index, result.op, error.message)
            }
        };
        human.push_detail(line);
    }
    if failed > 0 {
        human.push_warning(format!("{failed} request(s) failed"));
    }

    emit_success(ctx.output, "batch", &results, Some(&human))
}
