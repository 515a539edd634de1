//! Commit log configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Target size for the combiner's output segments (default: 500 MiB).
///
/// The combiner pairs sealed segments whose sizes sum under `1.75×` this
/// value, since combined-then-condensed output shrinks well below the sum.
pub const DEFAULT_MAX_SIZE_COMBINING: u64 = 500 * 1024 * 1024;

/// Rotation threshold for the active segment (default: 100 MiB).
pub const DEFAULT_MAX_SIZE_INDIVIDUAL: u64 = DEFAULT_MAX_SIZE_COMBINING / 5;

/// Slack factor applied to `max_size_combining` when selecting a pair.
pub const COMBINING_SLACK: f64 = 1.75;

/// Configuration for a [`CommitLogger`](crate::CommitLogger).
#[derive(Debug, Clone)]
pub struct CommitLogConfig {
    /// Parent directory under which the segment directory is created.
    pub root_path: PathBuf,

    /// Index identifier; the segment directory is named
    /// `<index_name>.hnsw.commitlog.d`.
    pub index_name: String,

    /// Period of the rotation and combine-and-condense timers.
    ///
    /// Zero disables background maintenance entirely; the logger then acts
    /// as a plain appender.
    pub maintenance_interval: Duration,

    /// Rotation threshold for the active segment, in bytes.
    pub max_size_individual: u64,

    /// Target segment size for the combiner, in bytes.
    pub max_size_combining: u64,
}

impl CommitLogConfig {
    /// Create a configuration with default size thresholds.
    pub fn new(
        root_path: impl Into<PathBuf>,
        index_name: impl Into<String>,
        maintenance_interval: Duration,
    ) -> Self {
        CommitLogConfig {
            root_path: root_path.into(),
            index_name: index_name.into(),
            maintenance_interval,
            max_size_individual: DEFAULT_MAX_SIZE_INDIVIDUAL,
            max_size_combining: DEFAULT_MAX_SIZE_COMBINING,
        }
    }

    /// Set the rotation threshold (builder pattern).
    pub fn with_max_size_individual(mut self, bytes: u64) -> Self {
        self.max_size_individual = bytes;
        self
    }

    /// Set the combiner target size (builder pattern).
    pub fn with_max_size_combining(mut self, bytes: u64) -> Self {
        self.max_size_combining = bytes;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index_name.is_empty() {
            return Err(ConfigError::EmptyIndexName);
        }
        if self.index_name.contains('/') || self.index_name.contains('\\') {
            return Err(ConfigError::IndexNameHasSeparator);
        }
        if self.max_size_individual == 0 || self.max_size_combining == 0 {
            return Err(ConfigError::ZeroSizeThreshold);
        }
        Ok(())
    }

    /// Configuration with tiny thresholds and a short timer, for tests.
    pub fn for_testing(root_path: impl Into<PathBuf>, index_name: impl Into<String>) -> Self {
        CommitLogConfig::new(root_path, index_name, Duration::from_millis(10))
            .with_max_size_individual(1024)
            .with_max_size_combining(4096)
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The index name is empty.
    #[error("index name must not be empty")]
    EmptyIndexName,

    /// The index name contains a path separator.
    #[error("index name must not contain a path separator")]
    IndexNameHasSeparator,

    /// A size threshold is zero.
    #[error("size thresholds must be non-zero")]
    ZeroSizeThreshold,
}
