//! # WAL Tests
//!
//! Append/replay round trips, segment rotation, batch durability, and
//! torn-tail tolerance.

use std::fs::OpenOptions;
use std::io::Write;

use bytes::Bytes;
use tempfile::TempDir;

use strata_storage::record::Record;
use strata_storage::wal::{Wal, WalConfig};

fn record(key: &str, value: &str, sequence: u64) -> Record {
    Record::put(
        Bytes::copy_from_slice(key.as_bytes()),
        Bytes::copy_from_slice(value.as_bytes()),
        sequence,
        None,
    )
}

#[test]
fn append_and_replay_round_trip() {
    let dir = TempDir::new().unwrap();
    let wal = Wal::open(dir.path(), WalConfig::default()).unwrap();

    for i in 1..=10u64 {
        wal.append(&record(&format!("key-{}", i), &format!("value-{}", i), i))
            .unwrap();
    }
    drop(wal);

    let replayed: Vec<Record> = Wal::replay(dir.path(), 0)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(replayed.len(), 10);
    assert_eq!(replayed[0].key.as_ref(), b"key-1");
    assert_eq!(replayed[9].sequence, 10);
}

#[test]
fn replay_skips_checkpointed_entries() {
    let dir = TempDir::new().unwrap();
    let wal = Wal::open(dir.path(), WalConfig::default()).unwrap();

    for i in 1..=5u64 {
        wal.append(&record(&format!("k{}", i), "v", i)).unwrap();
    }
    drop(wal);

    let replayed: Vec<Record> = Wal::replay(dir.path(), 3)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();

    let sequences: Vec<u64> = replayed.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![4, 5]);
}

#[test]
fn tombstones_survive_replay() {
    let dir = TempDir::new().unwrap();
    let wal = Wal::open(dir.path(), WalConfig::default()).unwrap();

    wal.append(&record("k", "v", 1)).unwrap();
    wal.append(&Record::tombstone(Bytes::from_static(b"k"), 2))
        .unwrap();
    drop(wal);

    let replayed: Vec<Record> = Wal::replay(dir.path(), 0)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(replayed.len(), 2);
    assert!(!replayed[0].tombstone);
    assert!(replayed[1].tombstone);
}

#[test]
fn rotation_spans_segments() {
    let dir = TempDir::new().unwrap();
    let wal = Wal::open(dir.path(), WalConfig::default()).unwrap();

    wal.append(&record("a", "1", 1)).unwrap();
    wal.append(&record("b", "2", 2)).unwrap();

    let retired = wal.rotate(3).unwrap();
    assert!(retired.path.exists());

    wal.append(&record("c", "3", 3)).unwrap();
    drop(wal);

    // Replay crosses the segment boundary in order.
    let replayed: Vec<Record> = Wal::replay(dir.path(), 0)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    let sequences: Vec<u64> = replayed.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
}

#[test]
fn retired_segment_can_be_removed() {
    let dir = TempDir::new().unwrap();
    let wal = Wal::open(dir.path(), WalConfig::default()).unwrap();

    wal.append(&record("a", "1", 1)).unwrap();
    let retired = wal.rotate(2).unwrap();
    wal.append(&record("b", "2", 2)).unwrap();

    wal.remove_segment(&retired).unwrap();
    assert!(!retired.path.exists());

    // Removing twice is harmless.
    wal.remove_segment(&retired).unwrap();

    drop(wal);
    let replayed: Vec<Record> = Wal::replay(dir.path(), 0)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].key.as_ref(), b"b");
}

#[test]
fn torn_tail_is_tolerated() {
    let dir = TempDir::new().unwrap();
    let wal = Wal::open(dir.path(), WalConfig::default()).unwrap();

    wal.append(&record("intact-1", "v", 1)).unwrap();
    wal.append(&record("intact-2", "v", 2)).unwrap();
    drop(wal);

    // Simulate a crash mid-append: garbage where the next entry would be.
    let segment = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension() == Some(std::ffi::OsStr::new("wal")))
        .unwrap();
    let mut file = OpenOptions::new().append(true).open(&segment).unwrap();
    file.write_all(&[0xDE, 0xAD, 0xBE, 0xEF, 0x01]).unwrap();
    drop(file);

    let replayed: Vec<Record> = Wal::replay(dir.path(), 0)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(replayed.len(), 2);

    // Reopening for appends truncates the torn tail and keeps going.
    let wal = Wal::open(dir.path(), WalConfig::default()).unwrap();
    wal.append(&record("after-recovery", "v", 3)).unwrap();
    drop(wal);

    let replayed: Vec<Record> = Wal::replay(dir.path(), 0)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(replayed.len(), 3);
    assert_eq!(replayed[2].key.as_ref(), b"after-recovery");
}

#[test]
fn batch_append_is_ordered() {
    let dir = TempDir::new().unwrap();
    let wal = Wal::open(dir.path(), WalConfig::default()).unwrap();

    let batch: Vec<Record> = (1..=4u64)
        .map(|i| record(&format!("batch-{}", i), "v", i))
        .collect();
    wal.append_batch(&batch).unwrap();
    drop(wal);

    let replayed: Vec<Record> = Wal::replay(dir.path(), 0)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    let sequences: Vec<u64> = replayed.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);
}

#[test]
fn prune_retired_keeps_active_segment() {
    let dir = TempDir::new().unwrap();
    let wal = Wal::open(dir.path(), WalConfig::default()).unwrap();

    wal.append(&record("a", "1", 1)).unwrap();
    wal.rotate(2).unwrap();
    wal.append(&record("b", "2", 2)).unwrap();
    wal.rotate(3).unwrap();
    wal.append(&record("c", "3", 3)).unwrap();

    wal.prune_retired().unwrap();
    drop(wal);

    let replayed: Vec<Record> = Wal::replay(dir.path(), 0)
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].key.as_ref(), b"c");
}
