//! Per-family manifest: the durable record of which sorted runs exist,
//! the options the family was created with, and the WAL replay
//! checkpoint. Stored as JSON for simplicity and human readability,
//! written atomically (temp file, fsync, rename) so it is never
//! observed half-written.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use strata_core::config::FamilyOptions;
use strata_core::error::{Error, Result};

use crate::sstable::RunInfo;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestData {
    pub options: FamilyOptions,
    /// Id handed to the next sorted run written for this family.
    pub next_run_id: u64,
    /// Highest sequence number durably contained in sorted runs; WAL
    /// replay starts just above it.
    pub flushed_sequence: u64,
    /// Current run list, newest first.
    pub runs: Vec<RunInfo>,
}

pub struct Manifest {
    dir: PathBuf,
    data: ManifestData,
}

impl Manifest {
    /// Create a fresh manifest for a new family and persist it.
    pub fn create(dir: &Path, options: FamilyOptions) -> Result<Self> {
        let manifest = Self {
            dir: dir.to_path_buf(),
            data: ManifestData {
                options,
                next_run_id: 1,
                flushed_sequence: 0,
                runs: Vec::new(),
            },
        };
        manifest.save()?;
        Ok(manifest)
    }

    /// Load an existing family's manifest.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = std::fs::read_to_string(&path)?;
        let data = serde_json::from_str(&content).map_err(|e| Error::Corruption {
            message: format!("failed to parse manifest {:?}: {}", path, e),
        })?;

        debug!(dir = ?dir, "loaded family manifest");
        Ok(Self {
            dir: dir.to_path_buf(),
            data,
        })
    }

    pub fn exists(dir: &Path) -> bool {
        dir.join(MANIFEST_FILE).exists()
    }

    /// Persist using atomic rename:
    /// 1. Write to a temporary file
    /// 2. fsync the temporary file
    /// 3. Rename over the final path (atomic on POSIX)
    pub fn save(&self) -> Result<()> {
        let manifest_path = self.dir.join(MANIFEST_FILE);
        let temp_path = self.dir.join(format!("{}.tmp", MANIFEST_FILE));

        let content =
            serde_json::to_string_pretty(&self.data).map_err(|e| Error::Corruption {
                message: format!("failed to serialize manifest: {}", e),
            })?;

        {
            let mut file = File::create(&temp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }

        std::fs::rename(&temp_path, &manifest_path)?;

        // Make the rename itself durable where the filesystem needs it
        #[cfg(unix)]
        {
            if let Ok(dir) = File::open(&self.dir) {
                let _ = dir.sync_all();
            }
        }

        Ok(())
    }

    pub fn options(&self) -> &FamilyOptions {
        &self.data.options
    }

    pub fn runs(&self) -> &[RunInfo] {
        &self.data.runs
    }

    pub fn flushed_sequence(&self) -> u64 {
        self.data.flushed_sequence
    }

    /// Highest sequence present anywhere in the run list.
    pub fn max_run_sequence(&self) -> u64 {
        self.data
            .runs
            .iter()
            .map(|r| r.max_sequence)
            .max()
            .unwrap_or(0)
    }

    /// Allocate the next run id.
    pub fn next_run_id(&mut self) -> u64 {
        let id = self.data.next_run_id;
        self.data.next_run_id += 1;
        id
    }

    /// Register a freshly flushed run at the head of the list and
    /// advance the WAL checkpoint past its contents.
    pub fn register_flush(&mut self, info: RunInfo) {
        self.data.flushed_sequence = self.data.flushed_sequence.max(info.max_sequence);
        self.data.runs.insert(0, info);
    }

    /// Swap compaction inputs for their merged replacement, preserving
    /// newest-first order: the output takes the position of the newest
    /// input.
    pub fn replace_runs(&mut self, input_ids: &[u64], output: RunInfo) {
        let insert_at = self
            .data
            .runs
            .iter()
            .position(|r| input_ids.contains(&r.id))
            .unwrap_or(self.data.runs.len());

        self.data.runs.retain(|r| !input_ids.contains(&r.id));
        self.data.runs.insert(insert_at.min(self.data.runs.len()), output);
    }

    /// Drop compaction inputs whose merge produced nothing (every
    /// record was a droppable tombstone or expired).
    pub fn replace_runs_with_nothing(&mut self, input_ids: &[u64]) {
        self.data.runs.retain(|r| !input_ids.contains(&r.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn run_info(id: u64, max_sequence: u64) -> RunInfo {
        RunInfo {
            id,
            path: PathBuf::from(format!("{:06}.sst", id)),
            file_size: 1024,
            record_count: 10,
            min_key: b"a".to_vec(),
            max_key: b"z".to_vec(),
            created_at: 0,
            max_sequence,
        }
    }

    #[test]
    fn create_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut manifest = Manifest::create(dir.path(), FamilyOptions::default()).unwrap();

        assert_eq!(manifest.next_run_id(), 1);
        manifest.register_flush(run_info(1, 42));
        manifest.save().unwrap();

        let reloaded = Manifest::load(dir.path()).unwrap();
        assert_eq!(reloaded.runs().len(), 1);
        assert_eq!(reloaded.flushed_sequence(), 42);
        assert_eq!(reloaded.data.next_run_id, 2);
    }

    #[test]
    fn newest_run_goes_first() {
        let dir = TempDir::new().unwrap();
        let mut manifest = Manifest::create(dir.path(), FamilyOptions::default()).unwrap();

        manifest.register_flush(run_info(1, 10));
        manifest.register_flush(run_info(2, 20));
        let ids: Vec<_> = manifest.runs().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn replace_runs_keeps_order() {
        let dir = TempDir::new().unwrap();
        let mut manifest = Manifest::create(dir.path(), FamilyOptions::default()).unwrap();

        for id in 1..=4 {
            manifest.register_flush(run_info(id, id * 10));
        }
        // runs: [4, 3, 2, 1]; merge 2+1 into 5
        manifest.replace_runs(&[1, 2], run_info(5, 20));
        let ids: Vec<_> = manifest.runs().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 3, 5]);
    }
}
