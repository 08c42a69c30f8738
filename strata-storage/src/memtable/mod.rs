//! # Memtable - In-Memory Write Buffer
//!
//! Recent writes live here, one latest record per key, until the buffer
//! reaches its family's flush threshold and is frozen and written out as
//! a sorted run.
//!
//! Two interchangeable kinds are selected per family at creation
//! (a tagged variant, deliberately not a trait hierarchy):
//!
//! - **Skip list** — probabilistic sorted structure, expected O(log n)
//!   insert/lookup, native sorted iteration. Tower height is bounded by
//!   `max_level`; `probability` is the per-level promotion chance, so the
//!   two together trade memory for search depth.
//! - **Hash table** — O(1) point operations; pays a full sort when a
//!   snapshot is taken.
//!
//! Readers proceed concurrently with the single writer through the
//! interior lock; at flush time the whole table is atomically swapped
//! out, so a drain never blocks new writes.

mod hashtable;
mod skiplist;

pub use skiplist::SkipList;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;

use strata_core::config::MemtableKind;
use strata_core::error::{Error, Result};

use crate::record::{Record, RECORD_HEADER_SIZE};

use hashtable::HashTable;

/// Per-record bookkeeping overhead added to the size estimate.
const ENTRY_OVERHEAD: usize = 64;

enum Inner {
    SkipList(SkipList),
    HashTable(HashTable),
}

pub struct Memtable {
    inner: RwLock<Inner>,
    size_bytes: AtomicUsize,
    entry_count: AtomicUsize,
    frozen: AtomicBool,
}

impl Memtable {
    pub fn new(kind: &MemtableKind) -> Self {
        let inner = match *kind {
            MemtableKind::SkipList {
                max_level,
                probability,
            } => Inner::SkipList(SkipList::new(max_level, probability)),
            MemtableKind::HashTable => Inner::HashTable(HashTable::new()),
        };

        Self {
            inner: RwLock::new(inner),
            size_bytes: AtomicUsize::new(0),
            entry_count: AtomicUsize::new(0),
            frozen: AtomicBool::new(false),
        }
    }

    /// Insert a record, replacing any older version of the same key.
    /// Last write wins by sequence number, which keeps WAL replay
    /// idempotent.
    pub fn insert(&self, record: Record) -> Result<()> {
        if self.frozen.load(Ordering::Acquire) {
            return Err(Error::Memtable {
                message: "memtable is frozen (being flushed)".to_string(),
            });
        }

        let added_size = estimate_size(&record);
        let replaced = {
            let mut inner = self.inner.write();
            match &mut *inner {
                Inner::SkipList(list) => list.insert(record),
                Inner::HashTable(table) => table.insert(record),
            }
        };

        match replaced {
            Some(old) => {
                let old_size = estimate_size(&old);
                self.size_bytes.fetch_add(added_size, Ordering::Relaxed);
                self.size_bytes.fetch_sub(old_size, Ordering::Relaxed);
            }
            None => {
                self.size_bytes.fetch_add(added_size, Ordering::Relaxed);
                self.entry_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(())
    }

    /// Record with the highest sequence number for `key`, tombstones
    /// included.
    pub fn get(&self, key: &[u8]) -> Option<Record> {
        let inner = self.inner.read();
        match &*inner {
            Inner::SkipList(list) => list.get(key).cloned(),
            Inner::HashTable(table) => table.get(key).cloned(),
        }
    }

    /// Accumulated byte estimate for flush-threshold comparison.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entry_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse further writes; called on the table being swapped out.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    /// Stable sorted copy of the contents as of the call, key-ascending,
    /// one record per key. This is what flush serializes and what
    /// cursors snapshot.
    pub fn snapshot(&self) -> Vec<Record> {
        let inner = self.inner.read();
        match &*inner {
            Inner::SkipList(list) => list.iter().cloned().collect(),
            Inner::HashTable(table) => table.sorted_records(),
        }
    }
}

fn estimate_size(record: &Record) -> usize {
    record.key.len() + record.value.len() + RECORD_HEADER_SIZE + ENTRY_OVERHEAD
}
