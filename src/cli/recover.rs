//! tally recover command implementation.

use crate::cli::Context;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};

pub fn run(ctx: &Context) -> Result<()> {
    let ledger = ctx.open_ledger()?;
    // Opening already ran one pass; a second one retries anything it skipped.
    let report = ledger.recovery_on_open().clone().merge(ledger.recover()?);

    let header = if report.is_clean() {
        "tally recover: nothing to do"
    } else if !report.conflicts.is_empty() {
        "tally recover: conflicting records need repair"
    } else {
        "tally recover: rolled back interrupted commits"
    };
    let mut human = HumanOutput::new(header);
    human.push_summary("rolled back", report.rolled_back.len().to_string());
    human.push_summary("documents restored", report.restored_documents.to_string());
    for txn_id in &report.rolled_back {
        human.push_detail(txn_id.to_string());
    }
    if report.skipped > 0 {
        human.push_warning(format!(
            "{} record(s) skipped because their locks are held",
            report.skipped
        ));
        human.push_next_step("tally recover");
    }
    for txn_id in &report.conflicts {
        human.push_warning(format!(
            "record {txn_id} matches neither image of a document it names; it was kept"
        ));
    }
    if !report.conflicts.is_empty() {
        human.push_next_step("repair the documents named in journal/, then tally recover");
    }

    emit_success(ctx.output, "recover", &report, Some(&human))
}
