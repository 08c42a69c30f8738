//! Sorted-run types and configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use strata_core::config::{CompressionAlgorithm, FamilyOptions};

use crate::sstable::CompressionType;

pub const RUN_MAGIC: &[u8; 8] = b"STRATSST";
pub const RUN_VERSION: u32 = 1;
pub const DEFAULT_BLOCK_SIZE: usize = 16 * 1024; // 16KB
pub const BLOCK_FOOTER_SIZE: usize = 5; // compression tag + crc32

/// Footer: meta off/len, index off/len, bloom off/len, magic, version,
/// checksum.
pub const FOOTER_SIZE: usize = 8 + 4 + 8 + 4 + 8 + 4 + 8 + 4 + 4;

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub block_size: usize,
    pub compression: CompressionType,
    /// Build a bloom filter while writing. Disabled filters cost nothing
    /// at read time: the bloom section is simply absent.
    pub bloom_filter: bool,
    pub bloom_false_positive_rate: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            compression: CompressionType::Zstd,
            bloom_filter: true,
            bloom_false_positive_rate: 0.01,
        }
    }
}

impl RunConfig {
    /// Derive the run settings a family's options call for.
    pub fn from_options(opts: &FamilyOptions) -> Self {
        let compression = if opts.compression_enabled {
            match opts.compression {
                CompressionAlgorithm::Zstd => CompressionType::Zstd,
                CompressionAlgorithm::Snappy => CompressionType::Snappy,
            }
        } else {
            CompressionType::None
        };

        Self {
            compression,
            bloom_filter: opts.bloom_filter,
            ..Default::default()
        }
    }
}

/// Metadata for one sorted run, persisted in the family manifest and in
/// the run's own meta block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub id: u64,
    pub path: PathBuf,
    pub file_size: u64,
    pub record_count: u64,
    #[serde(with = "serde_bytes")]
    pub min_key: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub max_key: Vec<u8>,
    pub created_at: u64,
    /// Highest sequence number contained in the run.
    pub max_sequence: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub last_key: bytes::Bytes,
    pub block_offset: u64,
    pub block_size: u32,
}
