//! Crate-wide error surface.
//!
//! Append-path errors are returned to the caller unchanged; maintenance-path
//! errors are logged by the background tasks and retried on the next tick.
//! Nothing here is fatal to the process.

use std::io;
use std::path::PathBuf;

use crate::config::ConfigError;
use crate::format::RecordError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CommitLogError>;

/// Errors surfaced by the commit log.
#[derive(Debug, thiserror::Error)]
pub enum CommitLogError {
    /// The segment directory could not be created or read.
    #[error("cannot access commit log directory {path}: {source}")]
    Directory {
        /// Directory that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A segment file could not be opened or created.
    #[error("cannot open segment {name}: {source}")]
    SegmentOpen {
        /// Segment basename that failed to open.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Read/write/flush/rename/unlink failure during normal operation.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A file in the segment directory has an unparseable basename.
    ///
    /// This aborts the current enumeration (it indicates external tampering)
    /// but destroys no state.
    #[error("segment name {name:?} is not a timestamp")]
    CorruptName {
        /// The offending basename.
        name: String,
    },

    /// A record could not be decoded.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// The logger was opened with an invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
