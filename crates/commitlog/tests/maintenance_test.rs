//! Integration tests for the orchestrator: rotation scheduling, shutdown
//! quiescence, and maintenance disablement.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;
use vektor_commitlog::segment::{SegmentDirectory, SegmentWriter};
use vektor_commitlog::testing::ReplayedGraph;
use vektor_commitlog::{CommitLogConfig, CommitLogger, Record};

/// Basename → file contents for every file in the segment directory.
fn snapshot(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut out = BTreeMap::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        let name = entry.file_name().to_string_lossy().into_owned();
        out.insert(name, std::fs::read(entry.path()).unwrap());
    }
    out
}

fn write_segment(dir: &SegmentDirectory, name: &str, records: &[Record]) {
    let mut writer = SegmentWriter::open(dir.path(), name).unwrap();
    for record in records {
        writer.append(record).unwrap();
    }
    writer.close().unwrap();
}

#[test]
fn test_rotation_splits_appends_across_segments() {
    let tmp = tempdir().unwrap();
    let config = CommitLogConfig::new(tmp.path(), "items", Duration::from_millis(10))
        .with_max_size_individual(64);
    let logger = CommitLogger::open(config).unwrap();

    for id in 0..20 {
        logger.add_node(id, 0).unwrap();
    }

    std::thread::sleep(Duration::from_millis(100));
    logger.shutdown();

    let dir = SegmentDirectory::create(tmp.path(), "items").unwrap();
    let segments = dir.list_oldest_first().unwrap();
    assert!(segments.len() >= 2, "expected rotation to seal a segment");

    let mut graph = ReplayedGraph::new();
    graph.replay_directory(&dir).unwrap();
    assert_eq!(graph.len(), 20);
    for id in 0..20 {
        assert_eq!(graph.node_state(id).unwrap().level, 0);
    }
}

#[test]
fn test_maintenance_condenses_sealed_segments() {
    let tmp = tempdir().unwrap();
    let config = CommitLogConfig::new(tmp.path(), "items", Duration::from_millis(5))
        .with_max_size_individual(32);
    let logger = CommitLogger::open(config).unwrap();

    for id in 0..10 {
        logger.add_node(id, 0).unwrap();
        logger.add_link_at_level(id, 0, id + 1).unwrap();
    }

    std::thread::sleep(Duration::from_millis(150));
    logger.shutdown();

    let dir = SegmentDirectory::create(tmp.path(), "items").unwrap();
    let segments = dir.list_oldest_first().unwrap();
    assert!(
        segments.iter().any(|s| s.is_condensed()),
        "expected at least one condensed segment"
    );

    let mut graph = ReplayedGraph::new();
    graph.replay_directory(&dir).unwrap();
    assert_eq!(graph.len(), 10);
    for id in 0..10 {
        assert_eq!(graph.node_state(id).unwrap().links.get(&0).unwrap(), &vec![id + 1]);
    }
}

#[test]
fn test_maintenance_combines_plain_sealed_segments() {
    let tmp = tempdir().unwrap();
    let dir = SegmentDirectory::create(tmp.path(), "items").unwrap();

    // two plain sealed segments plus the current one, as left behind by
    // rotations that no maintenance pass got to yet
    write_segment(
        &dir,
        "100",
        &[
            Record::AddNode { id: 1, level: 0 },
            Record::AddLinkAtLevel {
                id: 1,
                level: 0,
                target: 2,
            },
        ],
    );
    write_segment(&dir, "200", &[Record::AddNode { id: 2, level: 0 }]);
    write_segment(&dir, "300", &[Record::AddNode { id: 3, level: 0 }]);

    let mut expected = ReplayedGraph::new();
    expected.replay_directory(&dir).unwrap();

    let config = CommitLogConfig::new(tmp.path(), "items", Duration::from_millis(5));
    let logger = CommitLogger::open(config).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    logger.shutdown();

    // the sealed pair was merged under the older timestamp, then condensed
    let segments = dir.list_oldest_first().unwrap();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].timestamp(), 100);
    assert!(segments[0].is_condensed());
    assert_eq!(segments[1].name(), "300");

    let mut replayed = ReplayedGraph::new();
    replayed.replay_directory(&dir).unwrap();
    assert_eq!(replayed, expected);
}

#[test]
fn test_shutdown_quiesces_directory() {
    let tmp = tempdir().unwrap();
    let config = CommitLogConfig::new(tmp.path(), "items", Duration::from_millis(1))
        .with_max_size_individual(64);
    let logger = CommitLogger::open(config).unwrap();

    let stop = std::time::Instant::now() + Duration::from_millis(100);
    let mut id = 0;
    while std::time::Instant::now() < stop {
        logger.add_node(id, 0).unwrap();
        logger.add_link_at_level(id, 0, id + 1).unwrap();
        id += 1;
    }

    logger.shutdown();

    let dir_path = tmp.path().join("items.hnsw.commitlog.d");
    let before = snapshot(&dir_path);
    std::thread::sleep(Duration::from_millis(100));
    let after = snapshot(&dir_path);
    assert_eq!(before, after, "directory changed after shutdown returned");
}

#[test]
fn test_zero_interval_disables_maintenance() {
    let tmp = tempdir().unwrap();
    let config = CommitLogConfig::new(tmp.path(), "items", Duration::ZERO)
        .with_max_size_individual(8);
    let logger = CommitLogger::open(config).unwrap();

    // far over the rotation threshold, but nothing may rotate or condense
    for id in 0..50 {
        logger.add_node(id, 0).unwrap();
    }
    logger.flush().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let dir = SegmentDirectory::create(tmp.path(), "items").unwrap();
    let segments = dir.list_oldest_first().unwrap();
    assert_eq!(segments.len(), 1);
    assert!(!segments[0].is_condensed());

    logger.shutdown();
}

#[test]
fn test_append_order_is_preserved_on_disk() {
    let tmp = tempdir().unwrap();
    let config = CommitLogConfig::new(tmp.path(), "items", Duration::ZERO);
    let logger = CommitLogger::open(config).unwrap();

    logger.add_node(1, 2).unwrap();
    logger.add_link_at_level(1, 0, 2).unwrap();
    logger.replace_links_at_level(1, 0, vec![3, 4]).unwrap();
    logger.add_links_at_level(1, 1, vec![5]).unwrap();
    logger.clear_links_at_level(1, 1).unwrap();
    logger.add_tombstone(1).unwrap();
    logger.remove_tombstone(1).unwrap();
    logger.set_entry_point_with_max_layer(1, 2).unwrap();
    logger.flush().unwrap();

    let dir = SegmentDirectory::create(tmp.path(), "items").unwrap();
    let mut graph = ReplayedGraph::new();
    graph.replay_directory(&dir).unwrap();

    let node = graph.node_state(1).unwrap();
    assert_eq!(node.level, 2);
    assert_eq!(node.links.get(&0).unwrap(), &vec![3, 4]);
    assert!(node.links.get(&1).is_none());
    assert!(!node.tombstoned);
    assert_eq!(graph.entry_point(), Some((1, 2)));

    logger.shutdown();
}

#[test]
fn test_destroy_removes_directory() {
    let tmp = tempdir().unwrap();
    let config = CommitLogConfig::new(tmp.path(), "items", Duration::from_millis(10));
    let logger = CommitLogger::open(config).unwrap();
    logger.add_node(1, 0).unwrap();

    let dir_path = tmp.path().join("items.hnsw.commitlog.d");
    assert!(dir_path.exists());

    logger.destroy().unwrap();
    assert!(!dir_path.exists());
}

#[test]
fn test_shutdown_is_idempotent() {
    let tmp = tempdir().unwrap();
    let logger = CommitLogger::open(CommitLogConfig::for_testing(tmp.path(), "items")).unwrap();
    logger.add_node(1, 0).unwrap();

    logger.shutdown();
    logger.shutdown();
}

#[test]
fn test_open_rejects_invalid_config() {
    let tmp = tempdir().unwrap();
    let config = CommitLogConfig::new(tmp.path(), "", Duration::ZERO);
    assert!(CommitLogger::open(config).is_err());
}
