//! Sorted-run reader.
//!
//! Memory-maps the file once; all lookups and scans read through the
//! map. Point lookups consult the bloom filter first, then binary-search
//! the block index and the offsets array inside the block.

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt};
use bytes::{Buf, Bytes};
use memmap2::{Mmap, MmapOptions};

use strata_core::error::{Error, Result};

use crate::record::Record;
use crate::sstable::types::{BLOCK_FOOTER_SIZE, IndexEntry};
use crate::sstable::{
    decompress_block, BloomFilter, CompressionType, RunInfo, RunIterator, FOOTER_SIZE, RUN_MAGIC,
    RUN_VERSION,
};

pub struct RunReader {
    path: PathBuf,
    mmap: Mmap,
    info: RunInfo,
    index: RunIndex,
    bloom_filter: Option<BloomFilter>,
}

pub(crate) struct RunIndex {
    entries: Vec<IndexEntry>,
}

/// One decompressed data block with its entry offsets parsed out.
pub(crate) struct Block {
    data: Vec<u8>,
    offsets: Vec<u32>,
}

impl RunReader {
    pub fn open(path: impl AsRef<Path>, id: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_size = file.metadata()?.len();

        let mmap = unsafe {
            MmapOptions::new().map(&file).map_err(|e| Error::Io {
                message: format!("failed to mmap sorted run {:?}", path),
                source: e,
            })?
        };

        if file_size < FOOTER_SIZE as u64 {
            return Err(Error::Corruption {
                message: format!("sorted run {:?} smaller than footer", path),
            });
        }

        let footer_offset = (file_size - FOOTER_SIZE as u64) as usize;
        let mut cursor = Cursor::new(&mmap[footer_offset..]);

        let meta_offset = cursor.read_u64::<LittleEndian>()?;
        let meta_size = cursor.read_u32::<LittleEndian>()?;
        let index_offset = cursor.read_u64::<LittleEndian>()?;
        let index_size = cursor.read_u32::<LittleEndian>()?;
        let bloom_offset = cursor.read_u64::<LittleEndian>()?;
        let bloom_size = cursor.read_u32::<LittleEndian>()?;

        let mut magic = [0u8; 8];
        cursor.read_exact(&mut magic)?;
        if &magic != RUN_MAGIC {
            return Err(Error::Corruption {
                message: format!("invalid sorted run magic in {:?}", path),
            });
        }

        let version = cursor.read_u32::<LittleEndian>()?;
        if version != RUN_VERSION {
            return Err(Error::SortedRun {
                message: format!("unsupported sorted run version: {}", version),
                source: None,
            });
        }

        let _footer_crc = cursor.read_u32::<LittleEndian>()?;

        let meta = &mmap[meta_offset as usize..(meta_offset + meta_size as u64) as usize];
        let (record_count, min_key, max_key, created_at) = decode_meta(meta)?;

        let index_data = &mmap[index_offset as usize..(index_offset + index_size as u64) as usize];
        let index = RunIndex::load(index_data)?;

        let bloom_filter = if bloom_size > 0 {
            let bloom_data =
                &mmap[bloom_offset as usize..(bloom_offset + bloom_size as u64) as usize];
            Some(BloomFilter::deserialize(bloom_data)?)
        } else {
            None
        };

        let info = RunInfo {
            id,
            path: path.clone(),
            file_size,
            record_count,
            min_key,
            max_key,
            created_at,
            max_sequence: 0, // tracked by the manifest, not needed for reads
        };

        Ok(Self {
            path,
            mmap,
            info,
            index,
            bloom_filter,
        })
    }

    pub fn info(&self) -> &RunInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn block_count(&self) -> usize {
        self.index.entries.len()
    }

    /// Look up the record stored for `key`, if any. Tombstones and
    /// expired records are returned as-is; visibility is the caller's
    /// concern.
    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        if let Some(bloom) = &self.bloom_filter {
            if !bloom.may_contain(key) {
                return Ok(None);
            }
        }

        let block_idx = match self.index.find_block(key) {
            Some(idx) => idx,
            None => return Ok(None),
        };

        let block = self.load_block(block_idx)?;
        block.find(key)
    }

    /// First record of the run in key order.
    pub(crate) fn first_record(&self) -> Result<Option<Record>> {
        if self.index.entries.is_empty() {
            return Ok(None);
        }
        let block = self.load_block(0)?;
        block.record_at(0).map(Some)
    }

    /// Last record of the run in key order.
    pub(crate) fn last_record(&self) -> Result<Option<Record>> {
        if self.index.entries.is_empty() {
            return Ok(None);
        }
        let block = self.load_block(self.index.entries.len() - 1)?;
        block.record_at(block.len() - 1).map(Some)
    }

    /// First record with key strictly greater than `key`.
    pub(crate) fn seek_after(&self, key: &[u8]) -> Result<Option<Record>> {
        // First block whose last key is > target can contain the answer.
        let idx = self
            .index
            .entries
            .partition_point(|e| e.last_key.as_ref() <= key);
        if idx >= self.index.entries.len() {
            return Ok(None);
        }

        let block = self.load_block(idx)?;
        let pos = block.partition_point_gt(key)?;
        if pos < block.len() {
            return block.record_at(pos).map(Some);
        }

        // Target equals the block's last key and nothing follows inside
        // it; the answer opens the next block.
        if idx + 1 < self.index.entries.len() {
            let next = self.load_block(idx + 1)?;
            return next.record_at(0).map(Some);
        }
        Ok(None)
    }

    /// Last record with key strictly less than `key`.
    pub(crate) fn seek_before(&self, key: &[u8]) -> Result<Option<Record>> {
        if self.index.entries.is_empty() {
            return Ok(None);
        }

        let mut idx = self
            .index
            .entries
            .partition_point(|e| e.last_key.as_ref() < key);
        if idx >= self.index.entries.len() {
            idx = self.index.entries.len() - 1;
        }

        loop {
            let block = self.load_block(idx)?;
            let pos = block.partition_point_ge(key)?;
            if pos > 0 {
                return block.record_at(pos - 1).map(Some);
            }
            if idx == 0 {
                return Ok(None);
            }
            idx -= 1;
        }
    }

    /// Read, CRC-verify, and decompress the block at index `idx`.
    pub(crate) fn load_block(&self, idx: usize) -> Result<Block> {
        let entry = &self.index.entries[idx];
        let data = self.read_block(entry.block_offset, entry.block_size)?;
        Block::parse(data)
    }

    fn read_block(&self, offset: u64, size: u32) -> Result<Vec<u8>> {
        let payload_end = (offset + size as u64) as usize - BLOCK_FOOTER_SIZE;
        let payload = &self.mmap[offset as usize..payload_end];

        let compression = CompressionType::try_from(self.mmap[payload_end])?;
        let crc = (&self.mmap[payload_end + 1..payload_end + 5]).read_u32::<LittleEndian>()?;

        if crc32fast::hash(payload) != crc {
            return Err(Error::Corruption {
                message: format!("block CRC mismatch in {:?} at offset {}", self.path, offset),
            });
        }

        decompress_block(payload, compression)
    }

    /// Forward streaming iterator over every record in the run.
    pub fn iter(&self) -> RunIterator<'_> {
        RunIterator::new(self)
    }
}

impl RunIndex {
    fn load(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::Corruption {
                message: "sorted run index truncated".to_string(),
            });
        }

        let mut cursor = Cursor::new(data);
        cursor.seek(SeekFrom::End(-4))?;
        let entry_count = cursor.read_u32::<LittleEndian>()? as usize;
        cursor.seek(SeekFrom::Start(0))?;

        let mut entries = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            let key_len = cursor.read_u32::<LittleEndian>()? as usize;
            let mut key = vec![0u8; key_len];
            cursor.read_exact(&mut key)?;

            let block_offset = cursor.read_u64::<LittleEndian>()?;
            let block_size = cursor.read_u32::<LittleEndian>()?;

            entries.push(IndexEntry {
                last_key: Bytes::from(key),
                block_offset,
                block_size,
            });
        }

        Ok(Self { entries })
    }

    /// Index of the block that may contain `key`: the first block whose
    /// last key is >= the target. Blocks are sorted and non-overlapping.
    fn find_block(&self, key: &[u8]) -> Option<usize> {
        let idx = self.entries.partition_point(|e| e.last_key.as_ref() < key);
        (idx < self.entries.len()).then_some(idx)
    }
}

impl Block {
    fn parse(data: Vec<u8>) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::Corruption {
                message: "data block truncated".to_string(),
            });
        }

        let count_pos = data.len() - 4;
        let entry_count = (&data[count_pos..]).read_u32::<LittleEndian>()? as usize;

        let offsets_start = count_pos
            .checked_sub(entry_count * 4)
            .ok_or_else(|| Error::Corruption {
                message: "data block offsets array overruns block".to_string(),
            })?;

        let mut offsets = Vec::with_capacity(entry_count);
        let mut cursor = Cursor::new(&data[offsets_start..count_pos]);
        for _ in 0..entry_count {
            offsets.push(cursor.read_u32::<LittleEndian>()?);
        }

        Ok(Self { data, offsets })
    }

    pub(crate) fn len(&self) -> usize {
        self.offsets.len()
    }

    pub(crate) fn record_at(&self, idx: usize) -> Result<Record> {
        let offset = self.offsets[idx] as usize;
        Record::decode(&mut &self.data[offset..])
    }

    /// Key bytes at entry `idx` without decoding the whole record.
    fn key_at(&self, idx: usize) -> Result<&[u8]> {
        let offset = self.offsets[idx] as usize;
        let mut header = &self.data[offset..];
        if header.remaining() < 4 {
            return Err(Error::Corruption {
                message: "block entry truncated".to_string(),
            });
        }
        let key_len = header.get_u32_le() as usize;
        let key_start = offset + crate::record::RECORD_HEADER_SIZE;
        Ok(&self.data[key_start..key_start + key_len])
    }

    /// Binary search for `key`; exact match decoded, else None.
    fn find(&self, key: &[u8]) -> Result<Option<Record>> {
        let pos = self.partition_point_ge(key)?;
        if pos < self.len() && self.key_at(pos)? == key {
            return self.record_at(pos).map(Some);
        }
        Ok(None)
    }

    /// Index of the first entry with key >= target.
    fn partition_point_ge(&self, key: &[u8]) -> Result<usize> {
        let (mut left, mut right) = (0usize, self.len());
        while left < right {
            let mid = left + (right - left) / 2;
            if self.key_at(mid)? < key {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        Ok(left)
    }

    /// Index of the first entry with key > target.
    fn partition_point_gt(&self, key: &[u8]) -> Result<usize> {
        let (mut left, mut right) = (0usize, self.len());
        while left < right {
            let mid = left + (right - left) / 2;
            if self.key_at(mid)? <= key {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        Ok(left)
    }
}

fn decode_meta(data: &[u8]) -> Result<(u64, Vec<u8>, Vec<u8>, u64)> {
    let mut buf = data;
    if buf.remaining() < 12 {
        return Err(Error::Corruption {
            message: "sorted run meta block truncated".to_string(),
        });
    }

    let record_count = buf.get_u64_le();
    let min_len = buf.get_u32_le() as usize;
    if buf.remaining() < min_len + 4 {
        return Err(Error::Corruption {
            message: "sorted run meta block truncated".to_string(),
        });
    }
    let min_key = buf.copy_to_bytes(min_len).to_vec();

    let max_len = buf.get_u32_le() as usize;
    if buf.remaining() < max_len + 8 {
        return Err(Error::Corruption {
            message: "sorted run meta block truncated".to_string(),
        });
    }
    let max_key = buf.copy_to_bytes(max_len).to_vec();
    let created_at = buf.get_u64_le();

    Ok((record_count, min_key, max_key, created_at))
}
