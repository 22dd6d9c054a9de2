//! Platforms and engagement actions a task can ask for.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    YouTube,
    Instagram,
    Facebook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Like,
    Subscribe,
    Follow,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::YouTube, Platform::Instagram, Platform::Facebook];

    /// Actions that make sense on this platform
    pub fn actions(self) -> &'static [Action] {
        match self {
            Platform::YouTube => &[Action::Like, Action::Subscribe],
            Platform::Instagram | Platform::Facebook => &[Action::Like, Action::Follow],
        }
    }

    pub fn allows(self, action: Action) -> bool {
        self.actions().contains(&action)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::Instagram => "Instagram",
            Platform::Facebook => "Facebook",
        }
    }
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Like => "Like",
            Action::Subscribe => "Subscribe",
            Action::Follow => "Follow",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "youtube" => Ok(Platform::YouTube),
            "instagram" => Ok(Platform::Instagram),
            "facebook" => Ok(Platform::Facebook),
            _ => Err(Error::Validation(format!(
                "invalid platform '{}': must be YouTube, Instagram, or Facebook",
                s
            ))),
        }
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "like" => Ok(Action::Like),
            "subscribe" => Ok(Action::Subscribe),
            "follow" => Ok(Action::Follow),
            _ => Err(Error::Validation(format!(
                "invalid action '{}': must be Like, Subscribe, or Follow",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_pairs() {
        assert!(Platform::YouTube.allows(Action::Like));
        assert!(Platform::YouTube.allows(Action::Subscribe));
        assert!(!Platform::YouTube.allows(Action::Follow));

        for platform in [Platform::Instagram, Platform::Facebook] {
            assert!(platform.allows(Action::Like));
            assert!(platform.allows(Action::Follow));
            assert!(!platform.allows(Action::Subscribe));
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("youtube".parse::<Platform>().unwrap(), Platform::YouTube);
        assert_eq!(" Facebook ".parse::<Platform>().unwrap(), Platform::Facebook);
        assert_eq!("SUBSCRIBE".parse::<Action>().unwrap(), Action::Subscribe);
        assert!(matches!("tiktok".parse::<Platform>(), Err(Error::Validation(_))));
        assert!(matches!("share".parse::<Action>(), Err(Error::Validation(_))));
    }

    #[test]
    fn serializes_by_name() {
        assert_eq!(serde_json::to_string(&Platform::YouTube).unwrap(), "\"YouTube\"");
        assert_eq!(serde_json::to_string(&Action::Follow).unwrap(), "\"Follow\"");
    }
}
