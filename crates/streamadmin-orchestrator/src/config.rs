use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use streamadmin_common::protocol::{DEFAULT_POOL_NAME, NUM_PARTITIONS};
use thiserror::Error;

/// Retry loop of a single worker against its node.
///
/// The loop is bounded by wall-clock time, not by attempt count. A single
/// hung call can run past `max_elapsed_ms`; the ceiling is only checked
/// between attempts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Elapsed-time ceiling of the retry loop
    ///
    /// Default: 60000ms
    pub max_elapsed_ms: u64,
    /// Pause between two attempts against the same node
    ///
    /// Default: 100ms
    pub attempt_backoff_ms: u64,
}

impl WorkerConfig {
    pub fn max_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_ms)
    }

    pub fn attempt_backoff(&self) -> Duration {
        Duration::from_millis(self.attempt_backoff_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_elapsed_ms: 60_000,
            attempt_backoff_ms: 100,
        }
    }
}

/// Backoff between fan-out rounds.
///
/// When a round is abandoned (round-scope error, or the single-owner check
/// fails) the next round starts after an exponentially growing pause.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RoundRetryConfig {
    /// Pause before the second round
    ///
    /// Default: 50ms
    pub initial_backoff_ms: u64,
    /// Cap on the pause between rounds
    ///
    /// Default: 5000ms (5 seconds)
    pub max_backoff_ms: u64,
    /// Each retry waits: previous_backoff * multiplier
    ///
    /// Default: 2.0 (doubles each time)
    pub backoff_multiplier: f64,
    /// Rounds allowed per operation call, `None` for no limit
    ///
    /// Default: None
    pub max_rounds: Option<u32>,
}

impl RoundRetryConfig {
    /// Pause following one of `current_ms`.
    pub fn next_backoff(&self, current_ms: u64) -> u64 {
        std::cmp::min(
            (current_ms as f64 * self.backoff_multiplier) as u64,
            self.max_backoff_ms,
        )
    }
}

impl Default for RoundRetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 50,
            max_backoff_ms: 5000,
            backoff_multiplier: 2.0,
            max_rounds: None,
        }
    }
}

/// Everything a [`crate::StreamAdmin`] needs besides its collaborators.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StreamAdminConfig {
    /// Pool handed to `initial_position`
    pub pool: String,
    /// Partitions per bucket; an add without request timestamps expects all
    /// of them to become active
    pub num_partitions: u16,
    /// Prefix topic names for a test fleet
    pub testing: bool,
    pub worker: WorkerConfig,
    pub round_retry: RoundRetryConfig,
}

impl StreamAdminConfig {
    /// Reads a JSON config file; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_partitions == 0 {
            return Err(ConfigError::Invalid("num_partitions must be positive".to_string()));
        }
        if self.round_retry.initial_backoff_ms == 0 {
            return Err(ConfigError::Invalid(
                "round_retry.initial_backoff_ms must be positive".to_string(),
            ));
        }
        if self.round_retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "round_retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StreamAdminConfig {
    fn default() -> Self {
        Self {
            pool: DEFAULT_POOL_NAME.to_string(),
            num_partitions: NUM_PARTITIONS,
            testing: false,
            worker: WorkerConfig::default(),
            round_retry: RoundRetryConfig::default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
