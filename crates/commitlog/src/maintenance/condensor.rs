//! Segment condensation.
//!
//! HNSW construction revisits the same node's link lists many times, so a
//! raw segment is dominated by redundant per-node edits. The condensor
//! replays one sealed segment into an in-memory per-node state and emits a
//! deterministic, coalesced equivalent. Memory is proportional to the
//! number of distinct nodes touched, not to the record count; segments are
//! size-bounded by rotation.
//!
//! # Crash safety
//!
//! The output goes to `<ts>.scratch.tmp`, is fsynced, and only then renamed
//! to `<ts>.condensed`; the source is unlinked last. A failure before the
//! rename leaves the source intact for a retry and a scratch file that
//! future enumerations ignore.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use tracing::info;

use crate::error::{CommitLogError, Result};
use crate::format::Record;
use crate::segment::directory::{SegmentDirectory, SegmentName, CONDENSED_SUFFIX, SCRATCH_SUFFIX};
use crate::segment::reader::SegmentReader;

/// Per-level link list accumulated during the fold.
///
/// `replaced` marks the list as authoritative: it was seeded by a replace
/// or clear inside this segment, so emitting it wholesale (even empty) is
/// correct. A list seeded only by appends must be emitted as an append
/// batch, because the node may carry links from earlier segments that a
/// replace would wipe.
#[derive(Debug, Default)]
struct LinkSet {
    targets: Vec<u64>,
    replaced: bool,
}

/// Accumulated state of one node across the source segment.
#[derive(Debug, Default)]
struct NodeState {
    created: bool,
    level: u16,
    cleared_all: bool,
    links: BTreeMap<u16, LinkSet>,
    tombstone: Option<bool>,
    deleted: bool,
}

/// Fold of a whole segment: per-node states plus the global effects.
#[derive(Debug, Default)]
struct Fold {
    nodes: BTreeMap<u64, NodeState>,
    entry_point: Option<(u64, u16)>,
    was_reset: bool,
    records_in: u64,
}

impl Fold {
    fn node(&mut self, id: u64) -> &mut NodeState {
        self.nodes.entry(id).or_default()
    }

    fn apply(&mut self, record: Record) {
        self.records_in += 1;
        match record {
            Record::AddNode { id, level } => {
                // (re-)creation supersedes anything accumulated for the id
                let state = self.node(id);
                *state = NodeState {
                    created: true,
                    level,
                    ..NodeState::default()
                };
            }
            Record::SetEntryPointMaxLevel { id, level } => {
                self.entry_point = Some((id, level));
            }
            Record::AddLinkAtLevel { id, level, target } => {
                self.node(id).links.entry(level).or_default().targets.push(target);
            }
            Record::AddLinksAtLevel { id, level, targets } => {
                self.node(id)
                    .links
                    .entry(level)
                    .or_default()
                    .targets
                    .extend(targets);
            }
            Record::ReplaceLinksAtLevel { id, level, targets } => {
                self.node(id).links.insert(
                    level,
                    LinkSet {
                        targets,
                        replaced: true,
                    },
                );
            }
            Record::ClearLinksAtLevel { id, level } => {
                self.node(id).links.insert(
                    level,
                    LinkSet {
                        targets: Vec::new(),
                        replaced: true,
                    },
                );
            }
            Record::ClearLinks { id } => {
                let state = self.node(id);
                state.links.clear();
                state.cleared_all = true;
            }
            Record::AddTombstone { id } => {
                self.node(id).tombstone = Some(true);
            }
            Record::RemoveTombstone { id } => {
                self.node(id).tombstone = Some(false);
            }
            Record::DeleteNode { id } => {
                // keep creation so AddNode can precede the final DeleteNode
                let state = self.node(id);
                *state = NodeState {
                    created: state.created,
                    level: state.level,
                    deleted: true,
                    ..NodeState::default()
                };
            }
            Record::ResetIndex => {
                self.nodes.clear();
                self.entry_point = None;
                self.was_reset = true;
            }
        }
    }

    /// Deterministic emission order: reset first, then per node ascending
    /// by id (creation, link state ascending by level, tombstone edits,
    /// deletion last), then the entry point.
    fn into_records(self) -> Vec<Record> {
        let mut out = Vec::new();
        if self.was_reset {
            out.push(Record::ResetIndex);
        }
        for (id, state) in self.nodes {
            if state.created {
                out.push(Record::AddNode {
                    id,
                    level: state.level,
                });
            }
            if state.deleted {
                out.push(Record::DeleteNode { id });
                continue;
            }
            if state.cleared_all {
                out.push(Record::ClearLinks { id });
            }
            for (level, links) in state.links {
                if links.replaced {
                    out.push(Record::ReplaceLinksAtLevel {
                        id,
                        level,
                        targets: links.targets,
                    });
                } else if !links.targets.is_empty() {
                    out.push(Record::AddLinksAtLevel {
                        id,
                        level,
                        targets: links.targets,
                    });
                }
            }
            match state.tombstone {
                Some(true) => out.push(Record::AddTombstone { id }),
                Some(false) => out.push(Record::RemoveTombstone { id }),
                None => {}
            }
        }
        if let Some((id, level)) = self.entry_point {
            out.push(Record::SetEntryPointMaxLevel { id, level });
        }
        out
    }
}

/// Rewrites one sealed segment into its condensed equivalent.
#[derive(Debug)]
pub struct Condensor {
    dir: SegmentDirectory,
}

impl Condensor {
    /// Create a condensor over `dir`.
    pub fn new(dir: SegmentDirectory) -> Self {
        Condensor { dir }
    }

    /// Condense `segment`, replacing it with `<ts>.condensed`.
    pub fn condense(&self, segment: &SegmentName) -> Result<()> {
        let source_path = self.dir.segment_path(segment.name());
        let bytes_in = self.dir.size_of(segment)?;

        let mut reader = SegmentReader::open(&source_path)?;
        let mut fold = Fold::default();
        while let Some(record) = reader.next_record()? {
            fold.apply(record);
        }
        let records_in = fold.records_in;
        let records = fold.into_records();

        let scratch_name = format!("{}{SCRATCH_SUFFIX}", segment.name());
        let scratch_path = self.dir.segment_path(&scratch_name);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&scratch_path)
            .map_err(|source| CommitLogError::SegmentOpen {
                name: scratch_name.clone(),
                source,
            })?;

        let mut sink = BufWriter::new(file);
        let mut bytes_out = 0u64;
        for record in &records {
            record.write_to(&mut sink)?;
            bytes_out += record.encoded_len();
        }
        sink.flush()?;
        sink.get_ref().sync_all()?;
        drop(sink);

        let condensed_name = format!("{}{CONDENSED_SUFFIX}", segment.name());
        fs::rename(&scratch_path, self.dir.segment_path(&condensed_name))?;
        fs::remove_file(&source_path)?;

        info!(
            target: "vektor::condense",
            segment = %segment.name(),
            records_in,
            records_out = records.len(),
            bytes_in,
            bytes_out,
            "segment condensed"
        );
        Ok(())
    }
}
