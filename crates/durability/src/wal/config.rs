//! WAL configuration.

use std::time::Duration;

/// Default file name of the log inside its directory.
pub const DEFAULT_WAL_FILE_NAME: &str = "wal.log";

/// WAL configuration parameters.
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// File name of the log inside the WAL directory (default: `wal.log`).
    pub file_name: String,

    /// Maximum age of the last checkpoint before `maybe_checkpoint` compacts
    /// (default: 60s).
    pub checkpoint_interval: Duration,

    /// Number of committed-but-not-compacted entries that forces a
    /// checkpoint (default: 1000).
    pub checkpoint_threshold: usize,

    /// First backoff after a failed disk write (default: 50ms).
    pub retry_initial_backoff: Duration,

    /// Upper bound for the doubling backoff (default: 5s).
    pub retry_max_backoff: Duration,

    /// Call `sync_data` when a flush is requested (default: true).
    pub sync_on_flush: bool,
}

impl Default for WalConfig {
    fn default() -> Self {
        WalConfig {
            file_name: DEFAULT_WAL_FILE_NAME.to_string(),
            checkpoint_interval: Duration::from_secs(60),
            checkpoint_threshold: 1000,
            retry_initial_backoff: Duration::from_millis(50),
            retry_max_backoff: Duration::from_secs(5),
            sync_on_flush: true,
        }
    }
}

impl WalConfig {
    /// Create a new WAL configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the checkpoint interval (builder pattern).
    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Set the committed-entry threshold (builder pattern).
    pub fn with_checkpoint_threshold(mut self, threshold: usize) -> Self {
        self.checkpoint_threshold = threshold;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), WalConfigError> {
        if self.checkpoint_threshold == 0 {
            return Err(WalConfigError::ZeroThreshold);
        }
        if self.retry_initial_backoff.is_zero()
            || self.retry_initial_backoff > self.retry_max_backoff
        {
            return Err(WalConfigError::InvalidBackoff);
        }
        if self.file_name.is_empty() || self.file_name.contains(['/', '\\']) {
            return Err(WalConfigError::InvalidFileName(self.file_name.clone()));
        }
        Ok(())
    }

    /// Configuration with short timings for tests.
    pub fn for_testing() -> Self {
        WalConfig {
            checkpoint_interval: Duration::from_millis(200),
            checkpoint_threshold: 16,
            retry_initial_backoff: Duration::from_millis(5),
            retry_max_backoff: Duration::from_millis(50),
            ..Self::default()
        }
    }
}

/// WAL configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalConfigError {
    /// Threshold of zero would checkpoint on every commit marker.
    #[error("checkpoint threshold must be at least 1")]
    ZeroThreshold,

    /// Backoff is zero or inverted.
    #[error("retry backoff must be non-zero and not exceed the maximum")]
    InvalidBackoff,

    /// File name is empty or contains a path separator.
    #[error("invalid WAL file name '{0}'")]
    InvalidFileName(String),
}
