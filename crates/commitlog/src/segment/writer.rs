//! Buffered append-only writer over the active segment.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{CommitLogError, Result};
use crate::format::Record;
use crate::segment::directory::SegmentName;

/// Writer over the active segment file.
///
/// The file is opened with append-only semantics; the caller serializes
/// access (the orchestrator's writer lock). The tracked size includes bytes
/// still sitting in the write buffer, so rotation decisions never need a
/// stat call.
///
/// On an I/O error the caller receives the error unchanged and nothing is
/// rolled back: a partial record at the end of a segment is tolerated by
/// the read side.
#[derive(Debug)]
pub struct SegmentWriter {
    file: BufWriter<File>,
    name: String,
    timestamp: i64,
    size: u64,
}

impl SegmentWriter {
    /// Create (or reopen) the segment named after `timestamp`.
    pub fn create(dir: &Path, timestamp: i64) -> Result<Self> {
        Self::open(dir, &timestamp.to_string())
    }

    /// Open an existing segment basename for appending.
    ///
    /// Used on bootstrap to resume the current segment; the size is seeded
    /// from file metadata.
    pub fn open(dir: &Path, name: &str) -> Result<Self> {
        let timestamp = SegmentName::parse(name)?.timestamp();
        let path = dir.join(name);
        let open = |source| CommitLogError::SegmentOpen {
            name: name.to_string(),
            source,
        };
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(open)?;
        let size = file.metadata().map_err(open)?.len();

        Ok(SegmentWriter {
            file: BufWriter::new(file),
            name: name.to_string(),
            timestamp,
            size,
        })
    }

    /// Encode `record` into the write buffer.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        record.write_to(&mut self.file)?;
        self.size += record.encoded_len();
        Ok(())
    }

    /// Current segment size in bytes, buffered portion included.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Force buffered bytes to the OS.
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    /// Flush and fsync.
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        Ok(())
    }

    /// Flush, fsync, and release the file.
    pub fn close(mut self) -> Result<()> {
        self.sync()
    }

    /// Basename of the active file.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Timestamp encoded in the basename.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}
