//! Per-user read view: what the user can earn from, what they posted, and
//! their balance. Takes no locks; document writes are atomic renames.

use serde::{Deserialize, Serialize};

use crate::account::AccountStore;
use crate::error::Result;
use crate::task::{Task, TaskStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    pub available_tasks: Vec<Task>,
    pub own_tasks: Vec<Task>,
    pub current_points: i64,
}

pub fn get_user_view(tasks: &TaskStore, accounts: &AccountStore, user_id: &str) -> Result<UserView> {
    let current_points = accounts.get_balance(user_id)?;
    Ok(UserView {
        available_tasks: tasks.list_available(user_id)?,
        own_tasks: tasks.list_own(user_id)?,
        current_points,
    })
}
