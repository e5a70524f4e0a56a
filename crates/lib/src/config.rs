//! Policy values for the revision engine.
//!
//! The coalescing window and the scheduler's debounce/throttle intervals are
//! tuning knobs, not invariants. Only their ordering is enforced by
//! [`RevisionConfig::validate`]: `debounce < throttle` and
//! `coalesce_window <= throttle`.
//!
//! Configs load from JSON with durations in milliseconds; missing fields take
//! the defaults.
//!
//! ```
//! use folio::RevisionConfig;
//!
//! let config: RevisionConfig =
//!     serde_json::from_str(r#"{"coalesce_window_ms": 8000, "scheduler": {"debounce_ms": 2000}}"#)?;
//! assert_eq!(config.coalesce_window.as_secs(), 8);
//! assert_eq!(config.scheduler.throttle.as_secs(), 15);
//! config.validate()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::patch::DiffOptions;

/// Errors from loading or validating configuration.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A duration that must be positive is zero.
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    /// The debounce interval must be shorter than the throttle interval.
    #[error("debounce ({debounce:?}) must be shorter than throttle ({throttle:?})")]
    DebounceNotBelowThrottle { debounce: Duration, throttle: Duration },

    /// The coalescing window must not exceed the throttle interval.
    #[error("coalesce window ({window:?}) must not exceed throttle ({throttle:?})")]
    WindowExceedsThrottle { window: Duration, throttle: Duration },

    /// The diff cell budget must allow at least one comparison.
    #[error("diff_cell_budget must be greater than zero")]
    ZeroCellBudget,

    /// The config file could not be read.
    #[error("Failed to read config file {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for this schema.
    #[error("Failed to parse config")]
    Parse {
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Check if this error is a rule violation rather than a load failure.
    pub fn is_invalid_value(&self) -> bool {
        !matches!(self, ConfigError::Read { .. } | ConfigError::Parse { .. })
    }
}

impl From<ConfigError> for crate::Error {
    fn from(err: ConfigError) -> Self {
        crate::Error::Config(err)
    }
}

/// Edit scheduler timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Quiet period after the last edit before a save is attempted.
    #[serde(rename = "debounce_ms", with = "millis")]
    pub debounce: Duration,
    /// Minimum interval between the starts of two timer-driven saves.
    #[serde(rename = "throttle_ms", with = "millis")]
    pub throttle: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(5),
            throttle: Duration::from_secs(15),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce.is_zero() {
            return Err(ConfigError::ZeroDuration { field: "debounce" });
        }
        if self.throttle.is_zero() {
            return Err(ConfigError::ZeroDuration { field: "throttle" });
        }
        if self.debounce >= self.throttle {
            return Err(ConfigError::DebounceNotBelowThrottle {
                debounce: self.debounce,
                throttle: self.throttle,
            });
        }
        Ok(())
    }
}

/// Configuration for a [`Revisions`](crate::Revisions) service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevisionConfig {
    /// Saves closer together than this overwrite the latest history entry.
    #[serde(rename = "coalesce_window_ms", with = "millis")]
    pub coalesce_window: Duration,
    pub scheduler: SchedulerConfig,
    /// Largest list window the diff aligns with a full LCS table.
    pub diff_cell_budget: usize,
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            coalesce_window: Duration::from_secs(10),
            scheduler: SchedulerConfig::default(),
            diff_cell_budget: DiffOptions::default().cell_budget,
        }
    }
}

impl RevisionConfig {
    /// Check the ordering rules between the policy values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        if self.coalesce_window.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "coalesce_window",
            });
        }
        if self.coalesce_window > self.scheduler.throttle {
            return Err(ConfigError::WindowExceedsThrottle {
                window: self.coalesce_window,
                throttle: self.scheduler.throttle,
            });
        }
        if self.diff_cell_budget == 0 {
            return Err(ConfigError::ZeroCellBudget);
        }
        Ok(())
    }

    /// Load and validate a config from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse { source })?;
        config.validate()?;
        Ok(config)
    }

    pub(crate) fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            cell_budget: self.diff_cell_budget,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
