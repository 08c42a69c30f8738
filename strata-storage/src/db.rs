//! Database: the top-level registry of column families.
//!
//! A `Database` is an explicit handle with an open/close lifecycle —
//! deliberately not a process-wide singleton, so independent databases
//! can coexist in one process. Families are discovered on open by
//! scanning the root directory for manifests; the set is mutable only
//! through `create_family` / `drop_family`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::info;

use strata_core::config::{validate_family_name, FamilyOptions};
use strata_core::error::{Error, Result};

use crate::compaction;
use crate::cursor::Cursor;
use crate::family::ColumnFamily;
use crate::manifest::Manifest;
use crate::txn::Transaction;

pub(crate) struct DbInner {
    path: PathBuf,
    families: RwLock<HashMap<String, Arc<ColumnFamily>>>,
    closed: AtomicBool,
}

impl DbInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    pub(crate) fn family(&self, name: &str) -> Result<Arc<ColumnFamily>> {
        self.ensure_open()?;
        self.families
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::FamilyNotFound {
                name: name.to_string(),
            })
    }
}

impl Drop for DbInner {
    fn drop(&mut self) {
        // Background tasks must not outlive the handle.
        for family in self.families.read().values() {
            family.stop_merge_task();
        }
    }
}

pub struct Database {
    inner: Arc<DbInner>,
}

impl Database {
    /// Open an existing database or create a new one at `path`,
    /// reopening every column family found there (which replays each
    /// family's WAL).
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;

        let mut families = HashMap::new();
        for entry in std::fs::read_dir(&path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir = entry.path();
            if !Manifest::exists(&dir) {
                continue;
            }
            let name = match dir.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            let family = ColumnFamily::open(&path, &name)?;
            families.insert(name, Arc::new(family));
        }

        info!(path = ?path, families = families.len(), "opened database");

        Ok(Self {
            inner: Arc::new(DbInner {
                path,
                families: RwLock::new(families),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Flush every family, stop background tasks, and refuse further
    /// operations. Dropping the handle without closing is safe — the
    /// WAL recovers anything unflushed — but close makes it explicit.
    pub async fn close(&self) -> Result<()> {
        self.inner.ensure_open()?;

        let families: Vec<Arc<ColumnFamily>> =
            self.inner.families.read().values().cloned().collect();
        for family in &families {
            family.stop_merge_task();
            family.flush(true)?;
        }

        self.inner.closed.store(true, Ordering::Release);
        self.inner.families.write().clear();
        info!("closed database");
        Ok(())
    }

    // =========================================================================
    // Column family lifecycle
    // =========================================================================

    pub async fn create_family(&self, name: &str, options: FamilyOptions) -> Result<()> {
        self.inner.ensure_open()?;
        validate_family_name(name)?;
        options.validate()?;

        let mut families = self.inner.families.write();
        if families.contains_key(name) {
            return Err(Error::FamilyExists {
                name: name.to_string(),
            });
        }

        let family = ColumnFamily::create(&self.inner.path, name, options)?;
        families.insert(name.to_string(), Arc::new(family));
        Ok(())
    }

    /// Drop a family, deleting all of its on-disk state.
    pub async fn drop_family(&self, name: &str) -> Result<()> {
        self.inner.ensure_open()?;

        let family = self
            .inner
            .families
            .write()
            .remove(name)
            .ok_or_else(|| Error::FamilyNotFound {
                name: name.to_string(),
            })?;

        family.destroy()
    }

    pub fn families(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.families.read().keys().cloned().collect();
        names.sort();
        names
    }

    // =========================================================================
    // Point operations
    // =========================================================================

    /// Write a key-value pair. `ttl` of `None` never expires.
    pub async fn put(
        &self,
        family: &str,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.inner.family(family)?.put(key.into(), value.into(), ttl)
    }

    /// Read the newest visible value for a key. `Ok(None)` is the
    /// expected not-found outcome, distinct from any error.
    pub async fn get(&self, family: &str, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        self.inner.family(family)?.get(key.as_ref())
    }

    /// Delete a key by writing a tombstone. Deleting an absent key is
    /// not an error.
    pub async fn delete(&self, family: &str, key: impl Into<Bytes>) -> Result<()> {
        self.inner.family(family)?.delete(key.into())
    }

    /// Force the family's memtable to a sorted run regardless of the
    /// flush threshold.
    pub async fn flush(&self, family: &str) -> Result<()> {
        self.inner.family(family)?.flush(true)
    }

    // =========================================================================
    // Compaction
    // =========================================================================

    /// On-demand full merge of the family's sorted runs, with at most
    /// `max_threads` merges in flight at once.
    pub async fn compact(&self, family: &str, max_threads: usize) -> Result<()> {
        let family = self.inner.family(family)?;
        compaction::compact(family, max_threads).await
    }

    /// Start the periodic partial merge for a family: every `period`,
    /// merge the two oldest runs while at least `min_run_count` runs
    /// exist. Errors if already running for this family.
    pub async fn start_background_partial_merge(
        &self,
        family: &str,
        period: Duration,
        min_run_count: usize,
    ) -> Result<()> {
        let family = self.inner.family(family)?;
        compaction::start_background_partial_merge(family, period, min_run_count)
    }

    /// Stop the periodic partial merge. `Ok` even if none was running.
    pub async fn stop_background_partial_merge(&self, family: &str) -> Result<()> {
        self.inner.family(family)?.stop_merge_task();
        Ok(())
    }

    // =========================================================================
    // Transactions and cursors
    // =========================================================================

    /// Begin a transaction against this database handle.
    pub fn begin(&self) -> Transaction {
        Transaction::new(Arc::clone(&self.inner))
    }

    /// Open a snapshot cursor over one family, positioned on the first
    /// visible record.
    pub async fn cursor(&self, family: &str) -> Result<Cursor> {
        let family = self.inner.family(family)?;
        let (memtables, runs) = family.cursor_snapshot();
        Cursor::new(memtables, runs)
    }
}
