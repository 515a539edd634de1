//! Test support: an in-memory reference model of replayed graph state.
//!
//! [`ReplayedGraph`] applies records the way an index replayer would, and
//! is the executable definition of the replay contract a segment directory
//! must satisfy: equal graphs after replay means equal reconstructed
//! indexes. The integration tests use it to check that condensation and
//! combination are invisible to replay.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::format::Record;
use crate::segment::directory::SegmentDirectory;
use crate::segment::reader::SegmentReader;

/// One replayed node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayedNode {
    /// Maximum level of the node.
    pub level: u16,
    /// Link targets per level; a level with no links has no entry.
    pub links: BTreeMap<u16, Vec<u64>>,
    /// Whether the node currently carries a tombstone.
    pub tombstoned: bool,
}

/// In-memory graph state produced by replaying records in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayedGraph {
    nodes: BTreeMap<u64, ReplayedNode>,
    entry_point: Option<(u64, u16)>,
}

impl ReplayedGraph {
    /// Empty graph.
    pub fn new() -> Self {
        ReplayedGraph::default()
    }

    /// Apply one record.
    ///
    /// `AddNode` (re)initializes a node wholesale. Link edits on an id that
    /// was never added create the node implicitly, since a segment may edit
    /// nodes created in an earlier segment. An empty link list and an
    /// absent one are the same state.
    pub fn apply(&mut self, record: &Record) {
        match record {
            Record::AddNode { id, level } => {
                self.nodes.insert(
                    *id,
                    ReplayedNode {
                        level: *level,
                        ..ReplayedNode::default()
                    },
                );
            }
            Record::SetEntryPointMaxLevel { id, level } => {
                self.entry_point = Some((*id, *level));
            }
            Record::AddLinkAtLevel { id, level, target } => {
                self.node(*id).links.entry(*level).or_default().push(*target);
            }
            Record::AddLinksAtLevel { id, level, targets } => {
                if !targets.is_empty() {
                    self.node(*id)
                        .links
                        .entry(*level)
                        .or_default()
                        .extend_from_slice(targets);
                }
            }
            Record::ReplaceLinksAtLevel { id, level, targets } => {
                let node = self.node(*id);
                if targets.is_empty() {
                    node.links.remove(level);
                } else {
                    node.links.insert(*level, targets.clone());
                }
            }
            Record::ClearLinksAtLevel { id, level } => {
                self.node(*id).links.remove(level);
            }
            Record::ClearLinks { id } => {
                self.node(*id).links.clear();
            }
            Record::AddTombstone { id } => {
                self.node(*id).tombstoned = true;
            }
            Record::RemoveTombstone { id } => {
                self.node(*id).tombstoned = false;
            }
            Record::DeleteNode { id } => {
                self.nodes.remove(id);
            }
            Record::ResetIndex => {
                *self = ReplayedGraph::default();
            }
        }
    }

    /// Apply a slice of records in order.
    pub fn apply_all(&mut self, records: &[Record]) {
        for record in records {
            self.apply(record);
        }
    }

    /// Replay one segment file, tolerating a truncated tail.
    pub fn replay_segment(&mut self, path: &Path) -> Result<()> {
        let mut reader = SegmentReader::open(path)?;
        while let Some(record) = reader.next_record()? {
            self.apply(&record);
        }
        Ok(())
    }

    /// Replay a whole segment directory in timestamp order.
    pub fn replay_directory(&mut self, dir: &SegmentDirectory) -> Result<()> {
        for segment in dir.list_oldest_first()? {
            self.replay_segment(&dir.segment_path(segment.name()))?;
        }
        Ok(())
    }

    /// The replayed state of one node.
    pub fn node_state(&self, id: u64) -> Option<&ReplayedNode> {
        self.nodes.get(&id)
    }

    /// Current entry point, if any.
    pub fn entry_point(&self) -> Option<(u64, u16)> {
        self.entry_point
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node(&mut self, id: u64) -> &mut ReplayedNode {
        self.nodes.entry(id).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_node_reinitializes() {
        let mut graph = ReplayedGraph::new();
        graph.apply_all(&[
            Record::AddNode { id: 1, level: 2 },
            Record::AddLinkAtLevel {
                id: 1,
                level: 0,
                target: 5,
            },
            Record::AddTombstone { id: 1 },
            Record::AddNode { id: 1, level: 3 },
        ]);

        let node = graph.node_state(1).unwrap();
        assert_eq!(node.level, 3);
        assert!(node.links.is_empty());
        assert!(!node.tombstoned);
    }

    #[test]
    fn test_empty_and_absent_levels_are_equal_states() {
        let mut cleared = ReplayedGraph::new();
        cleared.apply_all(&[
            Record::AddNode { id: 1, level: 0 },
            Record::AddLinkAtLevel {
                id: 1,
                level: 0,
                target: 5,
            },
            Record::ClearLinksAtLevel { id: 1, level: 0 },
        ]);

        let mut replaced = ReplayedGraph::new();
        replaced.apply_all(&[
            Record::AddNode { id: 1, level: 0 },
            Record::ReplaceLinksAtLevel {
                id: 1,
                level: 0,
                targets: vec![],
            },
        ]);

        let mut untouched = ReplayedGraph::new();
        untouched.apply(&Record::AddNode { id: 1, level: 0 });

        assert_eq!(cleared, replaced);
        assert_eq!(cleared, untouched);
    }

    #[test]
    fn test_delete_removes_node() {
        let mut graph = ReplayedGraph::new();
        graph.apply_all(&[
            Record::AddNode { id: 1, level: 0 },
            Record::DeleteNode { id: 1 },
        ]);
        assert!(graph.node_state(1).is_none());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_reset_wipes_everything() {
        let mut graph = ReplayedGraph::new();
        graph.apply_all(&[
            Record::AddNode { id: 1, level: 0 },
            Record::SetEntryPointMaxLevel { id: 1, level: 0 },
            Record::ResetIndex,
        ]);
        assert!(graph.is_empty());
        assert_eq!(graph.entry_point(), None);
    }
}
