//! Sorted-run writer.
//!
//! Consumes records in (key asc, sequence desc) order — exactly one
//! version per key — and produces the immutable on-disk file. The caller
//! decides when the result is durable: `finish` flushes and fsyncs
//! before returning.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use bytes::Bytes;
use tracing::debug;

use strata_core::error::{Error, Result};
use strata_core::unix_now;

use crate::record::Record;
use crate::sstable::builder::encode_meta;
use crate::sstable::types::BLOCK_FOOTER_SIZE;
use crate::sstable::{
    compress_block, BlockBuilder, BloomFilter, IndexBuilder, RunConfig, RunInfo, FOOTER_SIZE,
    RUN_MAGIC, RUN_VERSION,
};

pub struct RunWriter {
    id: u64,
    path: PathBuf,
    writer: BufWriter<File>,
    config: RunConfig,
    current_block: BlockBuilder,
    index_builder: IndexBuilder,
    bloom_filter: Option<BloomFilter>,
    record_count: u64,
    max_sequence: u64,
    file_offset: u64,
    min_key: Option<Bytes>,
    max_key: Option<Bytes>,
}

impl RunWriter {
    /// Create a writer for run `id` at `path`. `expected_records` sizes
    /// the bloom filter; an estimate is fine.
    pub fn create(
        path: impl AsRef<Path>,
        id: u64,
        config: RunConfig,
        expected_records: usize,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        let bloom_filter = config
            .bloom_filter
            .then(|| BloomFilter::new(expected_records, config.bloom_false_positive_rate));

        Ok(Self {
            id,
            path,
            writer: BufWriter::new(file),
            current_block: BlockBuilder::new(config.block_size),
            config,
            index_builder: IndexBuilder::new(),
            bloom_filter,
            record_count: 0,
            max_sequence: 0,
            file_offset: 0,
            min_key: None,
            max_key: None,
        })
    }

    /// Append the next record. Records must arrive in ascending key
    /// order with unique keys.
    pub fn add(&mut self, record: &Record) -> Result<()> {
        if self.min_key.is_none() {
            self.min_key = Some(record.key.clone());
        }
        self.max_key = Some(record.key.clone());
        self.max_sequence = self.max_sequence.max(record.sequence);

        if let Some(bloom) = &mut self.bloom_filter {
            bloom.insert(&record.key);
        }

        if !self.current_block.add(record) {
            self.flush_block()?;
            if !self.current_block.add(record) {
                return Err(Error::SortedRun {
                    message: "record too large for block".to_string(),
                    source: None,
                });
            }
        }

        self.record_count += 1;
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.current_block.is_empty() {
            return Ok(());
        }

        let last_key = self.current_block.last_key();

        let block_data = self.current_block.finish();
        let compressed = compress_block(&block_data, self.config.compression)?;

        let block_offset = self.file_offset;
        let block_size = compressed.len() + BLOCK_FOOTER_SIZE;

        self.writer.write_all(&compressed)?;
        self.writer.write_u8(self.config.compression as u8)?;
        self.writer
            .write_u32::<LittleEndian>(crc32fast::hash(&compressed))?;

        self.file_offset += block_size as u64;

        if let Some(key) = last_key {
            self.index_builder.add(&key, block_offset, block_size as u32);
        }

        Ok(())
    }

    /// Flush remaining data, write meta/index/bloom/footer, fsync, and
    /// return the run's metadata.
    pub fn finish(mut self) -> Result<RunInfo> {
        self.flush_block()?;

        if self.index_builder.is_empty() && self.record_count > 0 {
            return Err(Error::SortedRun {
                message: "no index entries for non-empty run".to_string(),
                source: None,
            });
        }

        let created_at = unix_now();
        let min_key = self.min_key.take().unwrap_or_default();
        let max_key = self.max_key.take().unwrap_or_default();

        // Meta block
        let meta_offset = self.file_offset;
        let meta_data = encode_meta(self.record_count, &min_key, &max_key, created_at);
        self.writer.write_all(&meta_data)?;
        self.file_offset += meta_data.len() as u64;

        // Index block
        let index_offset = self.file_offset;
        let index_data = self.index_builder.finish();
        self.writer.write_all(&index_data)?;
        self.file_offset += index_data.len() as u64;

        // Bloom filter (absent when disabled)
        let bloom_offset = self.file_offset;
        let bloom_data = self
            .bloom_filter
            .as_ref()
            .map(|b| b.serialize())
            .unwrap_or_default();
        self.writer.write_all(&bloom_data)?;
        self.file_offset += bloom_data.len() as u64;

        // Footer
        self.writer.write_u64::<LittleEndian>(meta_offset)?;
        self.writer
            .write_u32::<LittleEndian>(meta_data.len() as u32)?;
        self.writer.write_u64::<LittleEndian>(index_offset)?;
        self.writer
            .write_u32::<LittleEndian>(index_data.len() as u32)?;
        self.writer.write_u64::<LittleEndian>(bloom_offset)?;
        self.writer
            .write_u32::<LittleEndian>(bloom_data.len() as u32)?;
        self.writer.write_all(RUN_MAGIC)?;
        self.writer.write_u32::<LittleEndian>(RUN_VERSION)?;

        let mut footer_crc = crc32fast::Hasher::new();
        footer_crc.update(&meta_offset.to_le_bytes());
        footer_crc.update(&index_offset.to_le_bytes());
        footer_crc.update(&bloom_offset.to_le_bytes());
        self.writer.write_u32::<LittleEndian>(footer_crc.finalize())?;

        let file_size = self.file_offset + FOOTER_SIZE as u64;

        self.writer.flush()?;
        // Durable before the run can be registered anywhere
        self.writer.get_ref().sync_all()?;

        debug!(
            run_id = self.id,
            records = self.record_count,
            bytes = file_size,
            "finished writing sorted run"
        );

        Ok(RunInfo {
            id: self.id,
            path: self.path,
            file_size,
            record_count: self.record_count,
            min_key: min_key.to_vec(),
            max_key: max_key.to_vec(),
            created_at,
            max_sequence: self.max_sequence,
        })
    }

    /// Abandon the run, removing the partial file. Used when a flush or
    /// compaction fails mid-write so a half-written run is never visible.
    pub fn abort(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
