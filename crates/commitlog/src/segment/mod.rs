//! Segment files and the per-index segment directory.
//!
//! - `directory`: enumerate segments in timestamp order, clean up stale
//!   combiner output, resolve the current segment
//! - `writer`: buffered append-only writer over the active segment
//! - `reader`: sequential record reader tolerating a truncated tail

pub mod directory;
pub mod reader;
pub mod writer;

pub use directory::{SegmentDirectory, SegmentName};
pub use reader::SegmentReader;
pub use writer::SegmentWriter;
