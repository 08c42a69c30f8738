//! Sorted runs are immutable, sorted files of records. They are the
//! primary on-disk format of the engine and the unit compaction
//! operates on.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Sorted Run File Structure                │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Data Blocks                      │    │
//! │  │  ┌──────────────────────────────────────────────┐   │    │
//! │  │  │ Block 1 (default 16KB, sorted records)       │   │    │
//! │  │  │ ┌─────────────────────────────────────────┐  │   │    │
//! │  │  │ │ Record 1 .. Record N (record codec)     │  │   │    │
//! │  │  │ │ [offset u32] * N                        │  │   │    │
//! │  │  │ │ [entry count u32]                       │  │   │    │
//! │  │  │ └─────────────────────────────────────────┘  │   │    │
//! │  │  │ Block Footer: [compression u8][crc32 u32]    │   │    │
//! │  │  └──────────────────────────────────────────────┘   │    │
//! │  │  Block 2...                                         │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │                                                             │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │ Meta Block                                          │    │
//! │  │  [record_count][min_key][max_key][created_at]       │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │                                                             │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │ Index Block                                         │    │
//! │  │  [last_key][offset][size] per data block            │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │                                                             │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │ Bloom Filter (optional)                             │    │
//! │  │  [num_hashes][num_bits][bit words]                  │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │                                                             │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ Footer (52 bytes)                                    │   │
//! │  │  [meta off/len][index off/len][bloom off/len]        │   │
//! │  │  [magic][version][checksum]                          │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Within one run every key appears at most once: flush snapshots and
//! compaction both emit a single (newest) version per key.

mod bloom;
mod builder;
mod compression;
mod iterator;
mod reader;
mod run;
mod types;
mod writer;

pub use bloom::BloomFilter;
pub use builder::{BlockBuilder, IndexBuilder};
pub use compression::{compress_block, decompress_block, CompressionType};
pub use iterator::RunIterator;
pub use reader::RunReader;
pub use run::SortedRun;
pub use types::{RunConfig, RunInfo, FOOTER_SIZE, RUN_MAGIC, RUN_VERSION};
pub use writer::RunWriter;
