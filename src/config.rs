//! Configuration loading and management
//!
//! Handles parsing of the `tally.toml` file kept in the data directory.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;

/// Name of the configuration file inside the data directory
pub const CONFIG_FILE: &str = "tally.toml";

/// Upper bound on internal commit retries
const MAX_COMMIT_RETRIES: u32 = 1;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ledger policy
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Completion engine tuning
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Ledger policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Balance granted when an account is opened
    #[serde(default = "default_signup_bonus")]
    pub signup_bonus: i64,

    /// Reward used when a task is created without explicit points
    #[serde(default = "default_task_points")]
    pub default_task_points: u32,

    /// Whether a creator's balance may drop below zero when debited
    #[serde(default = "default_true")]
    pub allow_negative_balance: bool,
}

fn default_signup_bonus() -> i64 {
    50
}

fn default_task_points() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            signup_bonus: default_signup_bonus(),
            default_task_points: default_task_points(),
            allow_negative_balance: true,
        }
    }
}

/// Completion engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long to wait for a task or account lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Internal retries after a storage fault before surfacing a transaction error
    #[serde(default = "default_commit_retries")]
    pub commit_retries: u32,
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

fn default_commit_retries() -> u32 {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            commit_retries: default_commit_retries(),
        }
    }
}

impl Config {
    /// Load configuration from a `tally.toml` file
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the data directory, or return defaults when absent
    pub fn load_from_dir(data_dir: &Path) -> crate::error::Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        self.ledger.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

impl LedgerConfig {
    fn validate(&self) -> crate::error::Result<()> {
        if self.signup_bonus < 0 {
            return Err(crate::error::Error::InvalidConfig(
                "ledger.signup_bonus must be >= 0".to_string(),
            ));
        }
        if self.default_task_points == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "ledger.default_task_points must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl EngineConfig {
    fn validate(&self) -> crate::error::Result<()> {
        if self.lock_timeout_ms == 0 {
            return Err(crate::error::Error::InvalidConfig(
                "engine.lock_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.commit_retries > MAX_COMMIT_RETRIES {
            return Err(crate::error::Error::InvalidConfig(format!(
                "engine.commit_retries must be <= {MAX_COMMIT_RETRIES}"
            )));
        }
        Ok(())
    }
}
