//! Sequential record reader over one segment.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{CommitLogError, Result};
use crate::format::{Record, RecordError};

/// Streaming reader over a segment's record stream.
///
/// A partial record at the end of the file is the expected residue of a
/// crash mid-write: it is logged, flagged through [`tail_truncated`], and
/// reported as a clean end of stream. An unknown tag is a real error.
///
/// [`tail_truncated`]: SegmentReader::tail_truncated
pub struct SegmentReader {
    reader: BufReader<File>,
    path: PathBuf,
    truncated: bool,
}

impl SegmentReader {
    /// Open a segment file for sequential reading.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| CommitLogError::SegmentOpen {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            source,
        })?;
        Ok(SegmentReader {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            truncated: false,
        })
    }

    /// Decode the next record, or `None` at the end of the stream.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        if self.truncated {
            return Ok(None);
        }
        match Record::read_from(&mut self.reader) {
            Ok(record) => Ok(record),
            Err(RecordError::Truncated) => {
                warn!(
                    target: "vektor::replay",
                    segment = %self.path.display(),
                    "partial record at end of segment, ignoring tail"
                );
                self.truncated = true;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the stream ended in a partial record.
    pub fn tail_truncated(&self) -> bool {
        self.truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::writer::SegmentWriter;
    use tempfile::tempdir;

    #[test]
    fn test_reads_back_in_order() {
        let tmp = tempdir().unwrap();
        let records = vec![
            Record::AddNode { id: 1, level: 2 },
            Record::AddLinkAtLevel {
                id: 1,
                level: 0,
                target: 2,
            },
            Record::SetEntryPointMaxLevel { id: 1, level: 2 },
        ];

        let mut writer = SegmentWriter::create(tmp.path(), 100).unwrap();
        for record in &records {
            writer.append(record).unwrap();
        }
        writer.close().unwrap();

        let mut reader = SegmentReader::open(&tmp.path().join("100")).unwrap();
        for expected in &records {
            assert_eq!(&reader.next_record().unwrap().unwrap(), expected);
        }
        assert!(reader.next_record().unwrap().is_none());
        assert!(!reader.tail_truncated());
    }

    #[test]
    fn test_truncated_tail_is_tolerated() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("100");

        let mut writer = SegmentWriter::create(tmp.path(), 100).unwrap();
        writer.append(&Record::AddNode { id: 1, level: 0 }).unwrap();
        writer.append(&Record::AddNode { id: 2, level: 0 }).unwrap();
        writer.close().unwrap();

        // chop into the middle of the second record
        let len = std::fs::metadata(&path).unwrap().len();
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 4).unwrap();

        let mut reader = SegmentReader::open(&path).unwrap();
        assert_eq!(
            reader.next_record().unwrap().unwrap(),
            Record::AddNode { id: 1, level: 0 }
        );
        assert!(reader.next_record().unwrap().is_none());
        assert!(reader.tail_truncated());
        // stays at end once the tail was hit
        assert!(reader.next_record().unwrap().is_none());
    }
}
