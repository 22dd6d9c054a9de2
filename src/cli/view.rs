//! tally view command implementation.

use crate::cli::task::task_line;
use crate::cli::Context;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};

pub fn run(ctx: &Context) -> Result<()> {
    let user = ctx.user()?;
    let ledger = ctx.open_ledger()?;
    let view = ledger.get_user_view(&user)?;

    let mut human = HumanOutput::new(format!("tally view: {user}"));
    human.push_summary("points", view.current_points.to_string());
    human.push_summary("available", view.available_tasks.len().to_string());
    human.push_summary("own", view.own_tasks.len().to_string());
    for task in &view.available_tasks {
        human.push_detail(format!("available {}", task_line(task)));
    }
    for task in &view.own_tasks {
        human.push_detail(format!("own {}", task_line(task)));
    }
    if let Some(first) = view.available_tasks.first() {
        human.push_next_step(format!("tally task complete {}", first.id));
    }

    emit_success(ctx.output, "view", &view, Some(&human))
}
