//! tally account command implementations.

use crate::account::Account;
use crate::cli::Context;
use crate::error::Result;
use crate::output::{emit_success, HumanOutput};

#[derive(serde::Serialize)]
struct AdjustOutput<'a> {
    user_id: &'a str,
    delta: i64,
    points: i64,
}

pub fn run_open(ctx: &Context, id: Option<String>) -> Result<()> {
    let user = ctx.user_or(id)?;
    let ledger = ctx.open_ledger()?;
    let account = ledger.open_account(&user)?;

    let mut human = HumanOutput::new(format!("tally account open: {}", account.id));
    push_account_summary(&mut human, &account);
    human.push_next_step("tally view");

    emit_success(ctx.output, "account open", &account, Some(&human))
}

pub fn run_show(ctx: &Context, id: Option<String>) -> Result<()> {
    let user = ctx.user_or(id)?;
    let ledger = ctx.open_ledger()?;
    let account = ledger.account(&user)?;

    let mut human = HumanOutput::new(format!("tally account show: {}", account.id));
    push_account_summary(&mut human, &account);

    emit_success(ctx.output, "account show", &account, Some(&human))
}

pub fn run_set(ctx: &Context, id: &str, points: i64, admin: bool) -> Result<()> {
    let ledger = ctx.open_ledger()?;
    let account = ledger.set_balance(id, points, admin)?;

    let mut human = HumanOutput::new(format!("tally account set: {}", account.id));
    push_account_summary(&mut human, &account);

    emit_success(ctx.output, "account set", &account, Some(&human))
}

pub fn run_adjust(ctx: &Context, id: &str, delta: i64, admin: bool) -> Result<()> {
    let ledger = ctx.open_ledger()?;
    let points = ledger.adjust_balance(id, delta, admin)?;

    let mut human = HumanOutput::new(format!("tally account adjust: {id}"));
    human.push_summary("delta", format!("{delta:+}"));
    human.push_summary("points", points.to_string());
    if points < 0 {
        human.push_warning("balance is negative");
    }

    let output = AdjustOutput {
        user_id: id,
        delta,
        points,
    };
    emit_success(ctx.output, "account adjust", &output, Some(&human))
}

pub fn run_list(ctx: &Context) -> Result<()> {
    let ledger = ctx.open_ledger()?;
    let accounts = ledger.list_accounts()?;

    let mut human = HumanOutput::new(format!("tally account list: {} account(s)", accounts.len()));
    for account in &accounts {
        human.push_detail(format!("{}: {} pts", account.id, account.points));
    }

    emit_success(ctx.output, "account list", &accounts, Some(&human))
}

fn push_account_summary(human: &mut HumanOutput, account: &Account) {
    human.push_summary("points", account.points.to_string());
    human.push_summary("opened", account.created_at.to_rfc3339());
    if account.points < 0 {
        human.push_warning("balance is negative");
    }
}
