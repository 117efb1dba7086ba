//! Monitor configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// What trackers do with lifecycle calls that arrive in the wrong state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidStatePolicy {
    /// Return `Error::InvalidState` to the caller
    Strict,
    /// Log, count in diagnostics and return `Ok(())`
    Drop,
}

impl Default for InvalidStatePolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            InvalidStatePolicy::Strict
        } else {
            InvalidStatePolicy::Drop
        }
    }
}

/// Playback control request issued when playback enters a blocked segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockAction {
    /// Seek to the end of the blocked range
    #[default]
    SeekPast,
    /// Pause playback
    Pause,
}

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Records buffered per tracker before a batch is handed off
    pub batch_size: usize,
    /// Maximum age of buffered records before a flush (milliseconds)
    pub flush_interval_ms: u64,
    /// Batches the delivery queue holds before hand-off is rejected
    pub queue_capacity: usize,
    /// Retries for a batch the dispatcher rejected
    pub max_retries: u32,
    /// Delay between delivery retries (milliseconds)
    pub retry_delay_ms: u64,
    /// Upper bound on draining delivery at shutdown (milliseconds)
    pub shutdown_timeout_ms: u64,
    /// Handling of out-of-order lifecycle calls
    pub invalid_state_policy: InvalidStatePolicy,
    /// Request issued on entering a blocked segment
    pub block_action: BlockAction,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            flush_interval_ms: 10_000,
            queue_capacity: 64,
            max_retries: 3,
            retry_delay_ms: 250,
            shutdown_timeout_ms: 2_000,
            invalid_state_policy: InvalidStatePolicy::default(),
            block_action: BlockAction::default(),
        }
    }
}

impl MonitorConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: MonitorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "queue_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
