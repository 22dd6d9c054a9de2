//! Acting user resolution.
//!
//! Resolution order:
//! 1) CLI --user (explicit)
//! 2) TALLY_USER environment variable
//!
//! The id is trusted as given; authentication happens before tally is called.

use crate::account::check_user_id;
use crate::error::{Error, Result};

/// Environment variable naming the acting user
pub const USER_ENV: &str = "TALLY_USER";

/// Resolve the acting user from the CLI flag or the environment.
pub fn resolve_user(cli_user: Option<&str>) -> Result<String> {
    let env_user = std::env::var(USER_ENV).ok();
    resolve_user_from(cli_user, env_user.as_deref())
}

fn resolve_user_from(cli_user: Option<&str>, env_user: Option<&str>) -> Result<String> {
    let user = non_empty(cli_user)
        .or_else(|| non_empty(env_user))
        .ok_or_else(|| {
            Error::InvalidArgument(format!("no acting user: pass --user or set {USER_ENV}"))
        })?;
    check_user_id(user)?;
    Ok(user.to_string())
}

fn non_empty(input: Option<&str>) -> Option<&str> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}
