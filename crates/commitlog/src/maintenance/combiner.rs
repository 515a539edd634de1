//! Segment combination.
//!
//! Merges the oldest adjacent pair of sealed segments, plain or condensed,
//! whose byte sizes sum under the threshold. Record streams are
//! self-delimited by tag, so the raw concatenation of two valid segments is
//! itself a valid segment. The output replaces the older pair member under
//! its own basename, preserving replay order; a plain output is picked up
//! by the condensor on a later tick, which is what the threshold slack
//! assumes: combined-then-condensed output shrinks well below the target.
//!
//! # Crash safety
//!
//! Output goes to `<basename>.combined.tmp`, is fsynced, and renamed over
//! the older source; only then is the younger source unlinked. The rename
//! is atomic and the sidecar begins with the older source's own bytes, so
//! no intermediate state loses data. An interrupted run leaves both
//! sources untouched and a sidecar that the next directory enumeration
//! deletes.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use tracing::info;

use crate::error::{CommitLogError, Result};
use crate::segment::directory::{SegmentDirectory, SegmentName, COMBINED_SUFFIX};

/// Merges adjacent sealed segments under a size budget.
#[derive(Debug)]
pub struct Combiner {
    dir: SegmentDirectory,
    threshold: u64,
}

impl Combiner {
    /// Create a combiner over `dir` with a combined-size `threshold`.
    pub fn new(dir: SegmentDirectory, threshold: u64) -> Self {
        Combiner { dir, threshold }
    }

    /// Combine the first eligible pair, oldest first.
    ///
    /// Returns `true` when a pair was combined, `false` when nothing was
    /// eligible. The newest segment is the one currently receiving appends
    /// and is never a candidate; every older segment is sealed and may be
    /// paired whether or not it has been condensed yet.
    pub fn combine_once(&self) -> Result<bool> {
        let segments = self.dir.list_oldest_first()?;
        if segments.is_empty() {
            return Ok(false);
        }
        let sealed = &segments[..segments.len() - 1];

        for pair in sealed.windows(2) {
            let (first, second) = (&pair[0], &pair[1]);
            let first_size = self.dir.size_of(first)?;
            let second_size = self.dir.size_of(second)?;
            if first_size + second_size > self.threshold {
                continue;
            }

            self.combine(first, second, first_size + second_size)?;
            return Ok(true);
        }

        Ok(false)
    }

    fn combine(&self, first: &SegmentName, second: &SegmentName, bytes: u64) -> Result<()> {
        let out_name = first.name();
        let tmp_name = format!("{out_name}{COMBINED_SUFFIX}");
        let tmp_path = self.dir.segment_path(&tmp_name);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|source| CommitLogError::SegmentOpen {
                name: tmp_name.clone(),
                source,
            })?;

        let mut sink = BufWriter::new(file);
        for source in [first, second] {
            let path = self.dir.segment_path(source.name());
            let mut input = File::open(&path).map_err(|e| CommitLogError::SegmentOpen {
                name: source.name().to_string(),
                source: e,
            })?;
            io::copy(&mut input, &mut sink)?;
        }
        sink.flush()?;
        sink.get_ref().sync_all()?;
        drop(sink);

        // atomically replaces `first`; the sidecar starts with its bytes
        fs::rename(&tmp_path, self.dir.segment_path(out_name))?;
        fs::remove_file(self.dir.segment_path(second.name()))?;

        info!(
            target: "vektor::combine",
            first = %first.name(),
            second = %second.name(),
            output = %out_name,
            bytes,
            "adjacent segments combined"
        );
        Ok(())
    }
}
