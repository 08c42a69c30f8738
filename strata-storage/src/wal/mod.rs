//! Write-Ahead Log.
//!
//! Every write is appended (and, by default, fsynced) here before it
//! becomes visible in the memtable, so a crash between append and
//! insert loses nothing: reopen replays every entry newer than the
//! manifest's flush checkpoint.
//!
//! One segment is active per family. Rotation happens exactly when the
//! family's memtable is frozen for flush: the active segment is
//! finalized and handed back as a [`RetiredSegment`], and a fresh
//! segment takes over. The retired file is deleted only after the
//! sorted run produced by that flush is durable and registered.

mod file;
mod iterator;
mod types;

pub use iterator::WalReplayIterator;
pub use types::{RetiredSegment, WalConfig, ENTRY_HEADER_SIZE, WAL_HEADER_SIZE};

use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info};

use strata_core::error::Result;

use crate::record::Record;

use file::{create_file, entry_size, finalize_header, recover_file, write_entry, WalFile};

pub struct Wal {
    dir: PathBuf,
    config: WalConfig,
    active: Mutex<WalFile>,
}

impl Wal {
    /// Open the WAL directory for a family, resuming the newest segment
    /// or creating the first one.
    pub fn open(dir: impl AsRef<Path>, config: WalConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let mut segments = list_segments(&dir)?;
        segments.sort_by_key(|(seq, _)| *seq);

        let active = match segments.last() {
            Some((_, path)) => recover_file(path, &config)?,
            None => create_file(&dir, 1, &config)?,
        };

        Ok(Self {
            dir,
            config,
            active: Mutex::new(active),
        })
    }

    /// Append one record. Durable (fsynced) before returning when
    /// `sync_on_write` is set — which is the engine default.
    pub fn append(&self, record: &Record) -> Result<()> {
        self.append_batch(std::slice::from_ref(record))
    }

    /// Append several records with a single sync at the end. The batch
    /// becomes durable as a unit: a failure before the sync leaves the
    /// caller free to treat the whole batch as unwritten (replay will
    /// stop at the torn tail).
    pub fn append_batch(&self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut active = self.active.lock();
        for record in records {
            write_entry(&mut active.file, record)?;
            active.size += entry_size(record) as u64;
            active.entry_count += 1;
            active.last_sequence = record.sequence;
        }

        if self.config.sync_on_write {
            active.file.flush()?;
            active.file.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// Force buffered entries to stable storage.
    pub fn sync(&self) -> Result<()> {
        let mut active = self.active.lock();
        active.file.flush()?;
        active.file.get_ref().sync_all()?;
        Ok(())
    }

    /// Finalize the active segment and start a new one whose first
    /// sequence is `next_sequence`. Returns the retired segment for
    /// deferred deletion by the flush pipeline.
    pub fn rotate(&self, next_sequence: u64) -> Result<RetiredSegment> {
        let mut active = self.active.lock();
        finalize_header(&mut active)?;

        let retired = RetiredSegment {
            path: active.path.clone(),
        };

        *active = create_file(&self.dir, next_sequence, &self.config)?;
        info!(next_sequence, "rotated WAL segment");

        Ok(retired)
    }

    /// Delete a retired segment once its data is durable elsewhere.
    pub fn remove_segment(&self, segment: &RetiredSegment) -> Result<()> {
        // The active segment is never handed out as retired, so this
        // can only unlink finalized files.
        match std::fs::remove_file(&segment.path) {
            Ok(()) => {
                debug!(path = ?segment.path, "deleted retired WAL segment");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every non-active segment. Only valid once all of their
    /// entries are durable in sorted runs — i.e. right after a
    /// recovery flush on reopen.
    pub fn prune_retired(&self) -> Result<()> {
        let active_path = self.active.lock().path.clone();
        for (_, path) in list_segments(&self.dir)? {
            if path != active_path {
                debug!(path = ?path, "pruning stale WAL segment");
                let _ = std::fs::remove_file(&path);
            }
        }
        Ok(())
    }

    /// Replay every entry with sequence > `start_sequence` across all
    /// segments in the directory, oldest first. Used before the Wal is
    /// opened for appending.
    pub fn replay(dir: impl AsRef<Path>, start_sequence: u64) -> Result<WalReplayIterator> {
        let dir = dir.as_ref();
        let mut segments = if dir.exists() {
            list_segments(dir)?
        } else {
            Vec::new()
        };
        segments.sort_by_key(|(seq, _)| *seq);

        let paths = segments.into_iter().map(|(_, p)| p).collect();
        WalReplayIterator::new(paths, start_sequence)
    }
}

fn list_segments(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension() == Some(std::ffi::OsStr::new("wal")) {
            if let Some(stem) = path.file_stem() {
                if let Ok(seq) = stem.to_string_lossy().parse::<u64>() {
                    files.push((seq, path));
                }
            }
        }
    }
    Ok(files)
}
