//! Segment directory enumeration and naming.
//!
//! One directory per index, `<root>/<index>.hnsw.commitlog.d/`. Segment
//! basenames encode their creation time in Unix seconds: `<ts>` for a plain
//! segment, `<ts>.condensed` for a condensed one. Maintenance writes through
//! `.scratch.tmp` (condensor) and `.combined.tmp` (combiner) sidecars, which
//! are never valid segments.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{CommitLogError, Result};

/// Suffix of a condensed (sealed, coalesced) segment.
pub const CONDENSED_SUFFIX: &str = ".condensed";

/// Suffix of an in-progress condensor sink.
pub const SCRATCH_SUFFIX: &str = ".scratch.tmp";

/// Suffix of an in-progress combiner sink.
pub const COMBINED_SUFFIX: &str = ".combined.tmp";

/// A parsed segment basename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentName {
    name: String,
    timestamp: i64,
    condensed: bool,
}

impl SegmentName {
    /// Parse a basename of the form `<ts>` or `<ts>.condensed`.
    ///
    /// Anything else is [`CommitLogError::CorruptName`].
    pub fn parse(name: &str) -> Result<Self> {
        let stem = name.strip_suffix(CONDENSED_SUFFIX).unwrap_or(name);
        let timestamp = stem
            .parse::<i64>()
            .map_err(|_| CommitLogError::CorruptName {
                name: name.to_string(),
            })?;
        Ok(SegmentName {
            name: name.to_string(),
            timestamp,
            condensed: stem.len() != name.len(),
        })
    }

    /// The basename as it appears on disk.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creation time encoded in the basename, Unix seconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Whether this segment has already been condensed.
    pub fn is_condensed(&self) -> bool {
        self.condensed
    }
}

/// Handle on one index's segment directory.
#[derive(Debug, Clone)]
pub struct SegmentDirectory {
    path: PathBuf,
}

impl SegmentDirectory {
    /// Create (or open) the segment directory for `index_name` under `root`.
    pub fn create(root: &Path, index_name: &str) -> Result<Self> {
        let path = root.join(format!("{index_name}.hnsw.commitlog.d"));
        fs::create_dir_all(&path).map_err(|source| CommitLogError::Directory {
            path: path.clone(),
            source,
        })?;
        Ok(SegmentDirectory { path })
    }

    /// The directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full path of a segment (or sidecar) basename inside this directory.
    pub fn segment_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Enumerate segments sorted ascending by timestamp.
    ///
    /// `.scratch.tmp` entries are skipped without touching disk (the
    /// condensor may legitimately be writing one right now). `.combined.tmp`
    /// entries are unlinked: they are the corrupt output of an interrupted
    /// combiner whose sources are still intact. Entries with equal
    /// timestamps are ordered by basename, which covers a `.condensed` file
    /// transiently coexisting with its source.
    pub fn list_oldest_first(&self) -> Result<Vec<SegmentName>> {
        let entries = fs::read_dir(&self.path).map_err(|source| CommitLogError::Directory {
            path: self.path.clone(),
            source,
        })?;

        let mut segments = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CommitLogError::Directory {
                path: self.path.clone(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();

            if name.ends_with(SCRATCH_SUFFIX) {
                continue;
            }
            if name.ends_with(COMBINED_SUFFIX) {
                debug!(
                    target: "vektor::commitlog",
                    file = %name,
                    "removing interrupted combiner output"
                );
                fs::remove_file(entry.path())?;
                continue;
            }

            segments.push(SegmentName::parse(&name)?);
        }

        segments.sort_by(|a, b| {
            (a.timestamp, a.name.as_str()).cmp(&(b.timestamp, b.name.as_str()))
        });
        Ok(segments)
    }

    /// The newest non-tmp segment, or `None` when the directory is empty.
    pub fn current(&self) -> Result<Option<SegmentName>> {
        Ok(self.list_oldest_first()?.pop())
    }

    /// Byte size of a segment as observed through the filesystem.
    pub fn size_of(&self, segment: &SegmentName) -> Result<u64> {
        let metadata = fs::metadata(self.segment_path(segment.name()))?;
        Ok(metadata.len())
    }

    /// Unlink the entire directory and everything in it.
    pub fn remove_all(&self) -> Result<()> {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CommitLogError::Directory {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
