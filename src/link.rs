//! Link normalization and per-platform validation.
//!
//! Canonical form is what gets stored and compared for duplicates:
//! lowercased, trimmed, one trailing slash removed, `http://` upgraded to
//! `https://`. A `www.` prefix is kept, so `facebook.com/page` and
//! `www.facebook.com/page` are distinct links.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::platform::{Action, Platform};

static YOUTUBE_LINK: OnceLock<Regex> = OnceLock::new();
static INSTAGRAM_LINK: OnceLock<Regex> = OnceLock::new();
static FACEBOOK_LINK: OnceLock<Regex> = OnceLock::new();

fn platform_regex(platform: Platform) -> &'static Regex {
    match platform {
        Platform::YouTube => YOUTUBE_LINK.get_or_init(|| {
            Regex::new(r"^https?://(www\.)?(youtube\.com|youtu\.be)/.+")
                .expect("YOUTUBE_LINK is valid")
        }),
        Platform::Instagram => INSTAGRAM_LINK.get_or_init(|| {
            Regex::new(r"^https?://(www\.)?instagram\.com/.+").expect("INSTAGRAM_LINK is valid")
        }),
        Platform::Facebook => FACEBOOK_LINK.get_or_init(|| {
            Regex::new(r"^https?://(www\.)?facebook\.com/.+").expect("FACEBOOK_LINK is valid")
        }),
    }
}

/// Reduce a submitted link to its canonical form.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    let trimmed = lowered.trim();
    let without_slash = trimmed.strip_suffix('/').unwrap_or(trimmed);
    match without_slash.strip_prefix("http://") {
        Some(rest) => format!("https://{rest}"),
        None => without_slash.to_string(),
    }
}

/// Whether a canonical link matches the platform's allow-list.
pub fn validate(platform: Platform, canonical: &str) -> bool {
    platform_regex(platform).is_match(canonical)
}

/// Whether two links name the same target after normalization.
pub fn same_link(a: &str, b: &str) -> bool {
    normalize(a).eq_ignore_ascii_case(&normalize(b))
}

/// Validate a task submission and return the canonical link.
///
/// Checks run in a fixed order: platform/action pair, then link shape.
pub fn check_submission(platform: Platform, action: Action, raw_link: &str) -> Result<String> {
    if !platform.allows(action) {
        return Err(Error::Validation(format!(
            "{action} is not a valid action for {platform}"
        )));
    }

    let canonical = normalize(raw_link);
    if canonical.is_empty() {
        return Err(Error::Validation("link cannot be empty".to_string()));
    }
    if !validate(platform, &canonical) {
        return Err(Error::Validation(format!(
            "invalid {platform} link: {canonical}"
        )));
    }
    Ok(canonical)
}
