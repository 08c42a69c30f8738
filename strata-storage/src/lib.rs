//! # StrataDB Storage Engine
//!
//! Embedded, durable, column-family-organized LSM key-value engine.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Write Path                              │
//! │                                                              │
//! │  put/delete ──> WAL (fsync) ──> MemTable                    │
//! │                   │                │ threshold              │
//! │                   ▼                ▼                        │
//! │                Persist          Flush to                    │
//! │                to Disk          Sorted Run                  │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Read Path                               │
//! │                                                              │
//! │  get ──> MemTable ──> Frozen MemTables ──> Runs (newest 1st)│
//! │            │                                  │              │
//! │            ▼                                  ▼              │
//! │         Hot Data                        Bloom Filters        │
//! │         (Fast)                          (Skip files)         │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Background                              │
//! │                                                              │
//! │  compact(n threads) ──> pair & merge runs ──> swap in list  │
//! │  partial merge task ──> merge oldest pair every period      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs in-process; there is no network layer. Each column
//! family is an isolated keyspace with its own memtable, WAL, sorted
//! runs, and tuning options.

pub mod compaction;
pub mod cursor;
pub mod db;
pub mod family;
pub mod manifest;
pub mod memtable;
pub mod merge;
pub mod record;
pub mod sstable;
pub mod txn;
pub mod wal;

pub use cursor::Cursor;
pub use db::Database;
pub use family::ColumnFamily;
pub use merge::MergeMode;
pub use record::Record;
pub use txn::{Transaction, TxnState};

// Re-export the core crate's surface so depending on the engine alone
// is enough.
pub use strata_core::{
    CompressionAlgorithm, Error, FamilyOptions, MemtableKind, Result,
};

/// Current version of the engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
