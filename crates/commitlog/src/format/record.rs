//! Commit log record codec.
//!
//! # Record Layout
//!
//! ```text
//! ┌─────────┬──────────────────────────────────────────────┐
//! │ Tag (1) │ Payload (fixed width, tag-determined)        │
//! └─────────┴──────────────────────────────────────────────┘
//!
//! ReplaceLinksAtLevel / AddLinksAtLevel payload:
//! ┌────────┬───────────┬────────────┬─────────────────────┐
//! │ Id (8) │ Level (2) │ Count (2)  │ Count × Target (8)  │
//! └────────┴───────────┴────────────┴─────────────────────┘
//! ```
//!
//! A kernel crash mid-write produces at worst a trailing partial record;
//! the read side reports that as [`RecordError::Truncated`] and replay
//! treats it as a clean end of the segment.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

const TAG_ADD_NODE: u8 = 0;
const TAG_SET_ENTRY_POINT_MAX_LEVEL: u8 = 1;
const TAG_ADD_LINK_AT_LEVEL: u8 = 2;
const TAG_REPLACE_LINKS_AT_LEVEL: u8 = 3;
const TAG_ADD_TOMBSTONE: u8 = 4;
const TAG_REMOVE_TOMBSTONE: u8 = 5;
const TAG_CLEAR_LINKS: u8 = 6;
const TAG_DELETE_NODE: u8 = 7;
const TAG_RESET_INDEX: u8 = 8;
const TAG_CLEAR_LINKS_AT_LEVEL: u8 = 9;
const TAG_ADD_LINKS_AT_LEVEL: u8 = 10;

/// One mutation of the in-memory HNSW graph.
///
/// Replaying every record of a segment directory in order reconstructs the
/// graph state at the time of the last append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A node joined the graph at the given maximum level.
    ///
    /// Re-adding an existing id re-initializes that node wholesale.
    AddNode {
        /// Node id.
        id: u64,
        /// Maximum level of the node.
        level: u16,
    },

    /// The search entry point moved.
    SetEntryPointMaxLevel {
        /// Entry point node id.
        id: u64,
        /// Top level of the entry point.
        level: u16,
    },

    /// One outgoing link appended to a node's list at one level.
    AddLinkAtLevel {
        /// Source node id.
        id: u64,
        /// Level of the edited list.
        level: u16,
        /// Target node id.
        target: u64,
    },

    /// A node's link list at one level replaced wholesale.
    ///
    /// An empty target list is equivalent to clearing the level.
    ReplaceLinksAtLevel {
        /// Source node id.
        id: u64,
        /// Level of the replaced list.
        level: u16,
        /// New link targets.
        targets: Vec<u64>,
    },

    /// A node was marked logically deleted.
    AddTombstone {
        /// Node id.
        id: u64,
    },

    /// A node's tombstone was lifted.
    RemoveTombstone {
        /// Node id.
        id: u64,
    },

    /// All link lists of a node discarded, every level.
    ClearLinks {
        /// Node id.
        id: u64,
    },

    /// A node physically removed from the graph.
    DeleteNode {
        /// Node id.
        id: u64,
    },

    /// The whole index wiped; replay starts from scratch.
    ResetIndex,

    /// A node's link list at one level discarded.
    ClearLinksAtLevel {
        /// Node id.
        id: u64,
        /// Cleared level.
        level: u16,
    },

    /// A batch of links appended to a node's list at one level.
    AddLinksAtLevel {
        /// Source node id.
        id: u64,
        /// Level of the edited list.
        level: u16,
        /// Appended link targets.
        targets: Vec<u64>,
    },
}

impl Record {
    fn tag(&self) -> u8 {
        match self {
            Record::AddNode { .. } => TAG_ADD_NODE,
            Record::SetEntryPointMaxLevel { .. } => TAG_SET_ENTRY_POINT_MAX_LEVEL,
            Record::AddLinkAtLevel { .. } => TAG_ADD_LINK_AT_LEVEL,
            Record::ReplaceLinksAtLevel { .. } => TAG_REPLACE_LINKS_AT_LEVEL,
            Record::AddTombstone { .. } => TAG_ADD_TOMBSTONE,
            Record::RemoveTombstone { .. } => TAG_REMOVE_TOMBSTONE,
            Record::ClearLinks { .. } => TAG_CLEAR_LINKS,
            Record::DeleteNode { .. } => TAG_DELETE_NODE,
            Record::ResetIndex => TAG_RESET_INDEX,
            Record::ClearLinksAtLevel { .. } => TAG_CLEAR_LINKS_AT_LEVEL,
            Record::AddLinksAtLevel { .. } => TAG_ADD_LINKS_AT_LEVEL,
        }
    }

    /// Exact on-disk size of this record in bytes.
    pub fn encoded_len(&self) -> u64 {
        match self {
            Record::AddNode { .. }
            | Record::SetEntryPointMaxLevel { .. }
            | Record::ClearLinksAtLevel { .. } => 1 + 8 + 2,
            Record::AddLinkAtLevel { .. } => 1 + 8 + 2 + 8,
            Record::ReplaceLinksAtLevel { targets, .. }
            | Record::AddLinksAtLevel { targets, .. } => 1 + 8 + 2 + 2 + 8 * targets.len() as u64,
            Record::AddTombstone { .. }
            | Record::RemoveTombstone { .. }
            | Record::ClearLinks { .. }
            | Record::DeleteNode { .. } => 1 + 8,
            Record::ResetIndex => 1,
        }
    }

    /// Encode this record into `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(self.tag())?;
        match self {
            Record::AddNode { id, level }
            | Record::SetEntryPointMaxLevel { id, level }
            | Record::ClearLinksAtLevel { id, level } => {
                w.write_u64::<LittleEndian>(*id)?;
                w.write_u16::<LittleEndian>(*level)?;
            }
            Record::AddLinkAtLevel { id, level, target } => {
                w.write_u64::<LittleEndian>(*id)?;
                w.write_u16::<LittleEndian>(*level)?;
                w.write_u64::<LittleEndian>(*target)?;
            }
            Record::ReplaceLinksAtLevel { id, level, targets }
            | Record::AddLinksAtLevel { id, level, targets } => {
                let count = u16::try_from(targets.len()).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "link list exceeds u16 capacity")
                })?;
                w.write_u64::<LittleEndian>(*id)?;
                w.write_u16::<LittleEndian>(*level)?;
                w.write_u16::<LittleEndian>(count)?;
                for target in targets {
                    w.write_u64::<LittleEndian>(*target)?;
                }
            }
            Record::AddTombstone { id }
            | Record::RemoveTombstone { id }
            | Record::ClearLinks { id }
            | Record::DeleteNode { id } => {
                w.write_u64::<LittleEndian>(*id)?;
            }
            Record::ResetIndex => {}
        }
        Ok(())
    }

    /// Decode the next record from `r`.
    ///
    /// Returns `Ok(None)` on a clean end of stream (EOF at a tag boundary).
    /// EOF inside a payload is [`RecordError::Truncated`]: the residue of a
    /// crash mid-write, tolerated by replay.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Option<Record>, RecordError> {
        let tag = match r.read_u8() {
            Ok(tag) => tag,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(RecordError::Io(e)),
        };

        let record = match tag {
            TAG_ADD_NODE => {
                let id = read_u64(r)?;
                let level = read_u16(r)?;
                Record::AddNode { id, level }
            }
            TAG_SET_ENTRY_POINT_MAX_LEVEL => {
                let id = read_u64(r)?;
                let level = read_u16(r)?;
                Record::SetEntryPointMaxLevel { id, level }
            }
            TAG_ADD_LINK_AT_LEVEL => {
                let id = read_u64(r)?;
                let level = read_u16(r)?;
                let target = read_u64(r)?;
                Record::AddLinkAtLevel { id, level, target }
            }
            TAG_REPLACE_LINKS_AT_LEVEL => {
                let (id, level, targets) = read_link_list(r)?;
                Record::ReplaceLinksAtLevel { id, level, targets }
            }
            TAG_ADD_TOMBSTONE => Record::AddTombstone { id: read_u64(r)? },
            TAG_REMOVE_TOMBSTONE => Record::RemoveTombstone { id: read_u64(r)? },
            TAG_CLEAR_LINKS => Record::ClearLinks { id: read_u64(r)? },
            TAG_DELETE_NODE => Record::DeleteNode { id: read_u64(r)? },
            TAG_RESET_INDEX => Record::ResetIndex,
            TAG_CLEAR_LINKS_AT_LEVEL => {
                let id = read_u64(r)?;
                let level = read_u16(r)?;
                Record::ClearLinksAtLevel { id, level }
            }
            TAG_ADD_LINKS_AT_LEVEL => {
                let (id, level, targets) = read_link_list(r)?;
                Record::AddLinksAtLevel { id, level, targets }
            }
            other => return Err(RecordError::UnknownTag(other)),
        };

        Ok(Some(record))
    }
}

fn read_u64<R: Read>(r: &mut R) -> Result<u64, RecordError> {
    r.read_u64::<LittleEndian>().map_err(eof_is_truncation)
}

fn read_u16<R: Read>(r: &mut R) -> Result<u16, RecordError> {
    r.read_u16::<LittleEndian>().map_err(eof_is_truncation)
}

fn read_link_list<R: Read>(r: &mut R) -> Result<(u64, u16, Vec<u64>), RecordError> {
    let id = read_u64(r)?;
    let level = read_u16(r)?;
    let count = read_u16(r)?;
    let mut targets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        targets.push(read_u64(r)?);
    }
    Ok((id, level, targets))
}

fn eof_is_truncation(e: io::Error) -> RecordError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        RecordError::Truncated
    } else {
        RecordError::Io(e)
    }
}

/// Record decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The stream ended inside a record payload.
    #[error("record truncated at end of segment")]
    Truncated,

    /// The tag byte is not a known record kind.
    #[error("unknown record tag {0}")]
    UnknownTag(u8),

    /// Underlying read failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}
