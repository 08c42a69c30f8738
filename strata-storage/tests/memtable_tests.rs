//! # Memtable Tests
//!
//! Both kinds behind the same contract: insert/lookup, newest-wins
//! versioning, size accounting, freeze semantics, and sorted snapshots.

use bytes::Bytes;

use strata_core::config::MemtableKind;
use strata_storage::memtable::Memtable;
use strata_storage::record::Record;

fn kinds() -> Vec<MemtableKind> {
    vec![
        MemtableKind::SkipList {
            max_level: 12,
            probability: 0.25,
        },
        MemtableKind::HashTable,
    ]
}

fn rec(key: &str, value: &str, sequence: u64) -> Record {
    Record::put(
        Bytes::copy_from_slice(key.as_bytes()),
        Bytes::copy_from_slice(value.as_bytes()),
        sequence,
        None,
    )
}

#[test]
fn insert_and_get_both_kinds() {
    for kind in kinds() {
        let table = Memtable::new(&kind);

        table.insert(rec("key1", "value1", 1)).unwrap();
        table.insert(rec("key2", "value2", 2)).unwrap();

        assert_eq!(table.get(b"key1").unwrap().value.as_ref(), b"value1");
        assert_eq!(table.get(b"key2").unwrap().value.as_ref(), b"value2");
        assert!(table.get(b"key3").is_none());
        assert_eq!(table.len(), 2);
    }
}

#[test]
fn newest_sequence_wins() {
    for kind in kinds() {
        let table = Memtable::new(&kind);

        table.insert(rec("key", "old", 1)).unwrap();
        table.insert(rec("key", "new", 5)).unwrap();
        assert_eq!(table.get(b"key").unwrap().value.as_ref(), b"new");
        assert_eq!(table.len(), 1);

        // A stale sequence (replayed entry) must not clobber newer data.
        table.insert(rec("key", "stale", 3)).unwrap();
        assert_eq!(table.get(b"key").unwrap().value.as_ref(), b"new");
    }
}

#[test]
fn tombstones_are_returned() {
    for kind in kinds() {
        let table = Memtable::new(&kind);

        table.insert(rec("key", "value", 1)).unwrap();
        table
            .insert(Record::tombstone(Bytes::from_static(b"key"), 2))
            .unwrap();

        let found = table.get(b"key").unwrap();
        assert!(found.tombstone);
        assert_eq!(found.sequence, 2);
    }
}

#[test]
fn size_estimate_grows_and_accounts_replacement() {
    for kind in kinds() {
        let table = Memtable::new(&kind);
        assert_eq!(table.size_bytes(), 0);

        table.insert(rec("key", "small", 1)).unwrap();
        let after_small = table.size_bytes();
        assert!(after_small > 0);

        table
            .insert(rec("key", &"x".repeat(1000), 2))
            .unwrap();
        let after_large = table.size_bytes();
        assert!(after_large > after_small);

        table.insert(rec("key", "small", 3)).unwrap();
        assert!(table.size_bytes() < after_large);
    }
}

#[test]
fn frozen_table_rejects_writes() {
    for kind in kinds() {
        let table = Memtable::new(&kind);
        table.insert(rec("a", "1", 1)).unwrap();

        table.freeze();
        let err = table.insert(rec("b", "2", 2)).unwrap_err();
        assert_eq!(err.error_code(), "MEMTABLE_ERROR");

        // Reads still work on a frozen table.
        assert!(table.get(b"a").is_some());
    }
}

#[test]
fn snapshot_is_sorted_and_stable() {
    for kind in kinds() {
        let table = Memtable::new(&kind);
        for i in [7u32, 2, 9, 1, 5, 3, 8, 0, 6, 4] {
            table.insert(rec(&format!("k{}", i), "v", i as u64 + 1)).unwrap();
        }

        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 10);
        assert!(snapshot.windows(2).all(|w| w[0].key < w[1].key));

        // Later writes don't retroactively change the snapshot.
        table.insert(rec("zzz", "late", 100)).unwrap();
        assert_eq!(snapshot.len(), 10);
    }
}

#[test]
fn skiplist_respects_small_max_level() {
    let table = Memtable::new(&MemtableKind::SkipList {
        max_level: 2,
        probability: 0.5,
    });

    for i in 0..200u32 {
        table
            .insert(rec(&format!("{:04}", i), "v", i as u64 + 1))
            .unwrap();
    }

    assert_eq!(table.len(), 200);
    assert_eq!(table.get(b"0123").unwrap().value.as_ref(), b"v");
    let snapshot = table.snapshot();
    assert!(snapshot.windows(2).all(|w| w[0].key < w[1].key));
}

#[test]
fn concurrent_readers_during_writes() {
    use std::sync::Arc;

    let table = Arc::new(Memtable::new(&MemtableKind::SkipList {
        max_level: 12,
        probability: 0.25,
    }));

    let writer = {
        let table = Arc::clone(&table);
        std::thread::spawn(move || {
            for i in 0..1000u64 {
                table
                    .insert(rec(&format!("w{:04}", i), "v", i + 1))
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let table = Arc::clone(&table);
            std::thread::spawn(move || {
                for i in 0..1000u64 {
                    // May or may not be present yet; must never panic.
                    let _ = table.get(format!("w{:04}", i % 100).as_bytes());
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(table.len(), 1000);
}
