//! Configuration module for Timebox.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `TIMEBOX_DATA_DIR` | No | platform data dir | Directory holding `my-todos.json` |
//! | `TIMEBOX_TICK_MS` | No | 1000 | Reconciliation period in milliseconds |
//! | `TIMEBOX_NOTIFICATIONS` | No | `ask` | Initial permission: `ask`, `granted`, `denied` |
//! | `TIMEBOX_WALL_CLOCK` | No | `local` | Recurrence wall clock: `local` or `utc` |
//! | `TIMEBOX_URGENT_MINUTES` | No | 5 | Remaining minutes under which a todo is urgent |
//!
//! # Example
//!
//! ```no_run
//! use timebox_engine::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Store: {}", config.store_path().display());
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use directories::{BaseDirs, ProjectDirs};
use thiserror::Error;

use crate::notification::Permission;
use crate::persistence::STORAGE_KEY;
use crate::recurrence::RecurrenceGenerator;

/// Default reconciliation period.
const DEFAULT_TICK_MS: u64 = 1000;

/// Fallback data directory name relative to home.
const DEFAULT_DATA_DIR: &str = ".timebox";

/// Default urgency threshold in minutes.
const DEFAULT_URGENT_MINUTES: u32 = crate::evaluator::DEFAULT_URGENT_MINUTES;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Which wall clock recurrence arithmetic runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WallClock {
    #[default]
    Local,
    Utc,
}

impl WallClock {
    /// Builds the matching recurrence generator.
    #[must_use]
    pub fn generator(self) -> RecurrenceGenerator {
        match self {
            Self::Local => RecurrenceGenerator::local(),
            Self::Utc => RecurrenceGenerator::utc(),
        }
    }
}

/// Configuration for Timebox.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the store file.
    pub data_dir: PathBuf,

    /// Period of the reconciliation ticker.
    pub tick: Duration,

    /// Notification permission before the startup request.
    pub notifications: Permission,

    /// Wall clock for recurrence.
    pub wall_clock: WallClock,

    /// Remaining minutes under which a timed todo is shown as urgent.
    pub urgent_minutes: u32,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `TIMEBOX_TICK_MS` is set but is not a positive integer
    /// - `TIMEBOX_NOTIFICATIONS` or `TIMEBOX_WALL_CLOCK` has an unknown value
    /// - `TIMEBOX_URGENT_MINUTES` is not an integer
    /// - No data directory is set and the home directory cannot be determined
    pub fn from_env() -> Result<Self, ConfigError> {
        // Optional: TIMEBOX_DATA_DIR (default: platform data dir)
        let data_dir = match env::var("TIMEBOX_DATA_DIR") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => default_data_dir()?,
        };

        // Optional: TIMEBOX_TICK_MS (default: 1000, must be > 0)
        let tick_ms = match env::var("TIMEBOX_TICK_MS") {
            Ok(val) => {
                let ms = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                    key: "TIMEBOX_TICK_MS".to_string(),
                    message: format!("expected positive integer, got '{val}'"),
                })?;
                if ms == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "TIMEBOX_TICK_MS".to_string(),
                        message: "tick interval must be greater than 0".to_string(),
                    });
                }
                ms
            }
            Err(_) => DEFAULT_TICK_MS,
        };

        let notifications = match env::var("TIMEBOX_NOTIFICATIONS") {
            Ok(val) => val
                .parse::<Permission>()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "TIMEBOX_NOTIFICATIONS".to_string(),
                    message,
                })?,
            Err(_) => Permission::Default,
        };

        let wall_clock = match env::var("TIMEBOX_WALL_CLOCK") {
            Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
                "local" => WallClock::Local,
                "utc" => WallClock::Utc,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "TIMEBOX_WALL_CLOCK".to_string(),
                        message: format!("expected local or utc, got '{val}'"),
                    })
                }
            },
            Err(_) => WallClock::Local,
        };

        let urgent_minutes = match env::var("TIMEBOX_URGENT_MINUTES") {
            Ok(val) => val.parse::<u32>().map_err(|_| ConfigError::InvalidValue {
                key: "TIMEBOX_URGENT_MINUTES".to_string(),
                message: format!("expected non-negative integer, got '{val}'"),
            })?,
            Err(_) => DEFAULT_URGENT_MINUTES,
        };

        Ok(Self {
            data_dir,
            tick: Duration::from_millis(tick_ms),
            notifications,
            wall_clock,
            urgent_minutes,
        })
    }

    /// Path of the JSON store file.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(format!("{STORAGE_KEY}.json"))
    }

    /// Urgency threshold as a duration.
    #[must_use]
    pub fn urgent_threshold(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.urgent_minutes))
    }
}

fn default_data_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dirs) = ProjectDirs::from("", "", "timebox") {
        return Ok(dirs.data_dir().to_path_buf());
    }
    let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
    Ok(base_dirs.home_dir().join(DEFAULT_DATA_DIR))
}
