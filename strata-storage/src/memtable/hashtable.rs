//! Hash-table memtable kind: O(1) point operations, sorted on demand
//! when a snapshot is taken.

use std::collections::HashMap;

use bytes::Bytes;

use crate::record::{internal_cmp, Record};

pub(crate) struct HashTable {
    data: HashMap<Bytes, Record>,
}

impl HashTable {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    /// Insert with last-write-wins by sequence; returns the replaced
    /// record, if any.
    pub fn insert(&mut self, record: Record) -> Option<Record> {
        match self.data.get(&record.key) {
            Some(existing) if existing.sequence > record.sequence => Some(record),
            _ => self.data.insert(record.key.clone(), record),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&Record> {
        self.data.get(key)
    }

    /// The full sort pass this kind pays for its O(1) writes.
    pub fn sorted_records(&self) -> Vec<Record> {
        let mut records: Vec<Record> = self.data.values().cloned().collect();
        records.sort_by(internal_cmp);
        records
    }
}
