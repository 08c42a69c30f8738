//! Shared ownership of immutable sorted runs.
//!
//! A run is referenced by the family's run list and by any live cursor
//! snapshot. Compaction replaces runs in the list but must not unlink a
//! file a snapshot can still read; marking the run obsolete defers the
//! unlink to whoever drops the final `Arc`.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use strata_core::error::Result;

use crate::record::Record;
use crate::sstable::{RunInfo, RunIterator, RunReader};

pub struct SortedRun {
    reader: RunReader,
    info: RunInfo,
    obsolete: AtomicBool,
}

impl SortedRun {
    /// Open an existing run file described by the manifest.
    pub fn open(info: RunInfo) -> Result<Self> {
        let reader = RunReader::open(&info.path, info.id)?;
        Ok(Self {
            reader,
            info,
            obsolete: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u64 {
        self.info.id
    }

    pub fn info(&self) -> &RunInfo {
        &self.info
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Record>> {
        self.reader.get(key)
    }

    pub fn iter(&self) -> RunIterator<'_> {
        self.reader.iter()
    }

    pub(crate) fn first_record(&self) -> Result<Option<Record>> {
        self.reader.first_record()
    }

    pub(crate) fn last_record(&self) -> Result<Option<Record>> {
        self.reader.last_record()
    }

    pub(crate) fn seek_after(&self, key: &[u8]) -> Result<Option<Record>> {
        self.reader.seek_after(key)
    }

    pub(crate) fn seek_before(&self, key: &[u8]) -> Result<Option<Record>> {
        self.reader.seek_before(key)
    }

    /// Mark the run superseded; its file is removed once the last
    /// reference drops.
    pub fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::Release);
    }
}

impl Drop for SortedRun {
    fn drop(&mut self) {
        if self.obsolete.load(Ordering::Acquire) {
            match std::fs::remove_file(&self.info.path) {
                Ok(()) => debug!(run_id = self.info.id, "removed obsolete sorted run"),
                Err(e) => warn!(
                    run_id = self.info.id,
                    error = %e,
                    "failed to remove obsolete sorted run"
                ),
            }
        }
    }
}
