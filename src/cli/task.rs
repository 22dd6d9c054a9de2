//! tally task command implementations.

use crate::cli::Context;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};
use crate::platform::{Action, Platform};
use crate::task::{NewTask, Task};

pub struct CreateOptions {
    pub platform: String,
    pub action: String,
    pub link: String,
    pub points: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFilter {
    All,
    Available,
    Own,
}

#[derive(serde::Serialize)]
struct DeleteReport<'a> {
    success: bool,
    task: &'a Task,
}

#[derive(serde::Serialize)]
struct CompleteReport {
    success: bool,
    #[serde(flatten)]
    receipt: crate::engine::CompletionReceipt,
}

pub fn run_create(ctx: &Context, options: CreateOptions) -> Result<()> {
    let user = ctx.user()?;
    let platform: Platform = options.platform.parse()?;
    let action: Action = options.action.parse()?;

    let ledger = ctx.open_ledger()?;
    let task = ledger.create_task(NewTask {
        creator_id: user,
        platform,
        action,
        link: options.link,
        points: options.points,
    })?;

    let mut human = HumanOutput::new(format!("tally task create: {}", task.id));
    push_task_summary(&mut human, &task);
    human.push_next_step(format!("tally task show {}", task.id));

    emit_success(ctx.output, "task create", &task, Some(&human))
}

pub fn run_complete(ctx: &Context, task_id: &str) -> Result<()> {
    let user = ctx.user()?;
    let ledger = ctx.open_ledger()?;
    let receipt = ledger.complete_task(task_id, &user)?;

    let mut human = HumanOutput::new(format!("tally task complete: {task_id}"));
    human.push_summary("earned", receipt.points_earned.to_string());
    human.push_summary("balance", receipt.new_balance.to_string());

    let report = CompleteReport {
        success: true,
        receipt,
    };
    emit_success(ctx.output, "task complete", &report, Some(&human))
}

pub fn run_rm(ctx: &Context, task_id: &str, admin: bool) -> Result<()> {
    let user = ctx.user()?;
    let ledger = ctx.open_ledger()?;
    let task = ledger.soft_delete_task(task_id, &user, admin)?;

    let mut human = HumanOutput::new(format!("tally task rm: {task_id}"));
    if let Some(deleted_at) = task.deleted_at {
        human.push_summary("deleted at", deleted_at.to_rfc3339());
    }
    if admin && task.creator_id != user {
        human.push_warning(format!("deleted a task owned by {}", task.creator_id));
    }

    let report = DeleteReport {
        success: true,
        task: &task,
    };
    emit_success(ctx.output, "task rm", &report, Some(&human))
}

pub fn run_show(ctx: &Context, task_id: &str) -> Result<()> {
    let ledger = ctx.open_ledger()?;
    let task = ledger.task(task_id)?;

    let mut human = HumanOutput::new(format!("tally task show: {}", task.id));
    push_task_summary(&mut human, &task);
    for completion in task.completions.iter() {
        human.push_detail(format!(
            "{} earned {} at {}",
            completion.user_id,
            completion.points_earned,
            completion.completed_at.to_rfc3339()
        ));
    }

    emit_success(ctx.output, "task show", &task, Some(&human))
}

pub fn run_list(ctx: &Context, filter: ListFilter) -> Result<()> {
    let ledger = ctx.open_ledger()?;
    let tasks = match filter {
        ListFilter::All => ledger.list_tasks()?,
        ListFilter::Available => {
            let user = ctx.user()?;
            ledger.get_user_view(&user)?.available_tasks
        }
        ListFilter::Own => {
            let user = ctx.user()?;
            ledger.get_user_view(&user)?.own_tasks
        }
    };

    let mut human = HumanOutput::new(format!("tally task list: {} task(s)", tasks.len()));
    for task in &tasks {
        human.push_detail(task_line(task));
    }

    emit_success(ctx.output, "task list", &tasks, Some(&human))
}

pub(crate) fn task_line(task: &Task) -> String {
    let state = if task.is_active { "" } else { " [deleted]" };
    format!(
        "{}: {} {} ({} pts) {}{}",
        task.id, task.platform, task.action, task.points, task.link, state
    )
}

fn push_task_summary(human: &mut HumanOutput, task: &Task) {
    human.push_summary("platform", task.platform.to_string());
    human.push_summary("action", task.action.to_string());
    human.push_summary("link", task.link.clone());
    human.push_summary("points", task.points.to_string());
    human.push_summary("creator", task.creator_id.clone());
    human.push_summary("completions", task.completions.len().to_string());
    if !task.is_active {
        human.push_summary("status", "deleted");
    }
}
