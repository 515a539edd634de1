//! On-disk record format.
//!
//! Records are a tagged union over a tag byte; all integer fields are
//! fixed-width little-endian. There is no length prefix, checksum, or
//! footer: the tag alone determines the payload length, except for the two
//! link-list variants which carry an explicit count.

mod record;

pub use record::{Record, RecordError};
