//! Configuration management for the worker.

use chrono::TimeDelta;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tidy_engine::{RetentionPolicy, DEFAULT_RETENTION_DAYS};

/// Default seconds between staleness purges.
pub const DEFAULT_PURGE_INTERVAL_SECS: u64 = 3600;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON snapshot the store is loaded from and saved to
    pub snapshot_path: PathBuf,
    /// Age after which cached like users are purged
    pub like_retention: TimeDelta,
    /// Time between staleness purges
    pub purge_interval: Duration,
    /// Run the start-up passes and one purge, then exit
    pub run_once: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let snapshot_path = lookup("TIDY_SNAPSHOT_PATH")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingSnapshotPath)?;

        let retention_days: i64 = lookup("TIDY_LIKE_RETENTION_DAYS")
            .unwrap_or_else(|| DEFAULT_RETENTION_DAYS.to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidRetention)?;
        let like_retention = RetentionPolicy::try_days(retention_days)
            .ok()
            .filter(|_| retention_days > 0)
            .ok_or(ConfigError::InvalidRetention)?
            .max_age;

        let interval_secs: u64 = lookup("TIDY_PURGE_INTERVAL_SECS")
            .unwrap_or_else(|| DEFAULT_PURGE_INTERVAL_SECS.to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidInterval)?;
        if interval_secs == 0 {
            return Err(ConfigError::InvalidInterval);
        }

        let run_once = match lookup("TIDY_RUN_ONCE").as_deref() {
            None | Some("") | Some("0") | Some("false") => false,
            Some("1") | Some("true") => true,
            Some(_) => return Err(ConfigError::InvalidRunOnce),
        };

        Ok(Self {
            snapshot_path,
            like_retention,
            purge_interval: Duration::from_secs(interval_secs),
            run_once,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TIDY_SNAPSHOT_PATH environment variable is required")]
    MissingSnapshotPath,

    #[error("Invalid TIDY_LIKE_RETENTION_DAYS value")]
    InvalidRetention,

    #[error("Invalid TIDY_PURGE_INTERVAL_SECS value")]
    InvalidInterval,

    #[error("Invalid TIDY_RUN_ONCE value")]
    InvalidRunOnce,
}
