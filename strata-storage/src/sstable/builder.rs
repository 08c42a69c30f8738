//! Block and index builders for sorted-run files.

use byteorder::{LittleEndian, WriteBytesExt};
use bytes::{BufMut, Bytes, BytesMut};

use crate::record::Record;
use crate::sstable::types::IndexEntry;

/// Builds one data block: encoded records followed by an offsets array
/// and the entry count, so readers can random-access entries in both
/// directions.
pub struct BlockBuilder {
    buffer: BytesMut,
    offsets: Vec<u32>,
    last_key: Option<Bytes>,
    max_size: usize,
}

impl BlockBuilder {
    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(max_size),
            offsets: Vec::new(),
            last_key: None,
            max_size,
        }
    }

    /// Add a record. Returns false when the block is full; the first
    /// record is always accepted regardless of size.
    pub fn add(&mut self, record: &Record) -> bool {
        let entry_size = record.encoded_len();
        if !self.is_empty() && self.buffer.len() + entry_size > self.max_size {
            return false;
        }

        self.offsets.push(self.buffer.len() as u32);
        record.encode(&mut self.buffer);
        self.last_key = Some(record.key.clone());

        true
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn last_key(&self) -> Option<Bytes> {
        self.last_key.clone()
    }

    pub fn entry_count(&self) -> usize {
        self.offsets.len()
    }

    /// Finish the block and return its uncompressed bytes, resetting the
    /// builder for reuse.
    pub fn finish(&mut self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.buffer.len() + self.offsets.len() * 4 + 4);

        result.extend_from_slice(&self.buffer);
        for offset in &self.offsets {
            result.write_u32::<LittleEndian>(*offset).unwrap();
        }
        result.write_u32::<LittleEndian>(self.offsets.len() as u32).unwrap();

        self.buffer.clear();
        self.offsets.clear();
        self.last_key = None;

        result
    }
}

/// Builds the sparse block index: the last key of each block plus the
/// block's file offset and on-disk size.
pub struct IndexBuilder {
    entries: Vec<IndexEntry>,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, last_key: &[u8], block_offset: u64, block_size: u32) {
        self.entries.push(IndexEntry {
            last_key: Bytes::copy_from_slice(last_key),
            block_offset,
            block_size,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish(&mut self) -> Vec<u8> {
        let mut buffer = Vec::new();

        for entry in &self.entries {
            buffer
                .write_u32::<LittleEndian>(entry.last_key.len() as u32)
                .unwrap();
            buffer.extend_from_slice(&entry.last_key);
            buffer.write_u64::<LittleEndian>(entry.block_offset).unwrap();
            buffer.write_u32::<LittleEndian>(entry.block_size).unwrap();
        }
        buffer
            .write_u32::<LittleEndian>(self.entries.len() as u32)
            .unwrap();

        buffer
    }
}

/// Serialized meta block: record count, key range, creation time.
pub(crate) fn encode_meta(
    record_count: u64,
    min_key: &[u8],
    max_key: &[u8],
    created_at: u64,
) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u64_le(record_count);
    buf.put_u32_le(min_key.len() as u32);
    buf.put_slice(min_key);
    buf.put_u32_le(max_key.len() as u32);
    buf.put_slice(max_key);
    buf.put_u64_le(created_at);
    buf.to_vec()
}
