//! tally init command implementation
//!
//! Creates the data directory layout and a default `tally.toml`.

use crate::cli::Context;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::output::{emit_success, HumanOutput};

pub fn run(ctx: &Context) -> Result<()> {
    let data_dir = ctx.data_dir()?;
    let report = Ledger::init(&data_dir)?;

    let header = if report.created_config {
        "tally init: initialized data directory"
    } else {
        "tally init: nothing to do"
    };

    let mut human = HumanOutput::new(header);
    human.push_summary("data dir", data_dir.display().to_string());
    human.push_summary(
        "config",
        if report.created_config {
            "created tally.toml"
        } else {
            "kept existing tally.toml"
        },
    );
    human.push_next_step("tally --user <id> account open");

    emit_success(ctx.output, "init", &report, Some(&human))
}
