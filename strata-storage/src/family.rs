//! Column family: an isolated keyspace owning one active memtable, one
//! WAL, and a newest-first list of sorted runs.
//!
//! ## Write path
//!
//! ```text
//! put/delete ──► WAL append (fsync) ──► memtable insert
//!                                          │ threshold reached
//!                                          ▼
//!                        swap in fresh memtable + rotate WAL
//!                                          │ (off the write lock)
//!                                          ▼
//!                        frozen memtable ──► sorted run ──► manifest
//!                                          │
//!                                          ▼
//!                              retired WAL segment deleted
//! ```
//!
//! Writers never block on flush: the swap is the only step under the
//! rotation write lock, and the writer that crossed the threshold does
//! the file work while others proceed into the fresh memtable. Reads
//! consult active, then frozen memtables, then runs, newest first.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use strata_core::config::FamilyOptions;
use strata_core::error::Result;
use strata_core::unix_now;

use crate::compaction::MergeTask;
use crate::manifest::Manifest;
use crate::memtable::Memtable;
use crate::record::Record;
use crate::sstable::{RunConfig, RunInfo, RunWriter, SortedRun};
use crate::wal::{RetiredSegment, Wal, WalConfig};

const WAL_DIR: &str = "wal";
const RUNS_DIR: &str = "sstables";

/// A memtable frozen for flushing, paired with the WAL segment that
/// covered it.
#[derive(Clone)]
pub(crate) struct FrozenMemtable {
    pub memtable: Arc<Memtable>,
    pub segment: RetiredSegment,
}

/// One operation inside a write batch.
pub(crate) enum BatchOp {
    Put {
        key: Bytes,
        value: Bytes,
        ttl: Option<Duration>,
    },
    Delete {
        key: Bytes,
    },
}

pub struct ColumnFamily {
    name: String,
    dir: PathBuf,
    options: FamilyOptions,
    wal: Wal,
    /// Next sequence number to assign.
    sequence: AtomicU64,
    /// Writers hold this shared; the memtable/WAL swap holds it
    /// exclusively, so a record always lands in the memtable paired
    /// with the segment it was logged to.
    rotation: RwLock<()>,
    active: RwLock<Arc<Memtable>>,
    /// Frozen memtables awaiting flush, oldest first.
    frozen: RwLock<Vec<FrozenMemtable>>,
    /// Sorted runs, newest first.
    runs: RwLock<Vec<Arc<SortedRun>>>,
    manifest: Mutex<Manifest>,
    /// Serializes flush file work so runs register in freeze order.
    flush_lock: Mutex<()>,
    /// Serializes merges; the background task skips a tick when an
    /// on-demand compaction holds it.
    pub(crate) compaction_guard: tokio::sync::Mutex<()>,
    pub(crate) merge_task: Mutex<Option<MergeTask>>,
}

impl ColumnFamily {
    /// Create a brand new family on disk.
    pub(crate) fn create(root: &Path, name: &str, options: FamilyOptions) -> Result<Self> {
        options.validate()?;

        let dir = root.join(name);
        std::fs::create_dir_all(dir.join(WAL_DIR))?;
        std::fs::create_dir_all(dir.join(RUNS_DIR))?;

        let manifest = Manifest::create(&dir, options.clone())?;
        let wal = Wal::open(dir.join(WAL_DIR), WalConfig::default())?;

        info!(family = name, "created column family");

        Ok(Self {
            name: name.to_string(),
            active: RwLock::new(Arc::new(Memtable::new(&options.memtable))),
            options,
            wal,
            sequence: AtomicU64::new(1),
            rotation: RwLock::new(()),
            frozen: RwLock::new(Vec::new()),
            runs: RwLock::new(Vec::new()),
            manifest: Mutex::new(manifest),
            flush_lock: Mutex::new(()),
            compaction_guard: tokio::sync::Mutex::new(()),
            merge_task: Mutex::new(None),
            dir,
        })
    }

    /// Reopen an existing family: load the manifest, open its runs,
    /// replay the WAL past the flush checkpoint, and make the recovered
    /// data durable again before serving.
    pub(crate) fn open(root: &Path, name: &str) -> Result<Self> {
        let dir = root.join(name);
        let manifest = Manifest::load(&dir)?;
        let options = manifest.options().clone();

        let mut runs = Vec::with_capacity(manifest.runs().len());
        for info in manifest.runs() {
            runs.push(Arc::new(SortedRun::open(info.clone())?));
        }

        remove_orphan_runs(&dir.join(RUNS_DIR), manifest.runs())?;

        // Replay everything newer than the flush checkpoint.
        let checkpoint = manifest.flushed_sequence();
        let memtable = Memtable::new(&options.memtable);
        let mut replayed = 0usize;
        let mut max_sequence = checkpoint.max(manifest.max_run_sequence());

        for entry in Wal::replay(dir.join(WAL_DIR), checkpoint)? {
            let record = entry?;
            max_sequence = max_sequence.max(record.sequence);
            memtable.insert(record)?;
            replayed += 1;
        }

        if replayed > 0 {
            info!(
                family = name,
                entries = replayed,
                checkpoint,
                "replayed WAL entries after crash"
            );
        }

        let wal = Wal::open(dir.join(WAL_DIR), WalConfig::default())?;

        let family = Self {
            name: name.to_string(),
            active: RwLock::new(Arc::new(memtable)),
            options,
            wal,
            sequence: AtomicU64::new(max_sequence + 1),
            rotation: RwLock::new(()),
            frozen: RwLock::new(Vec::new()),
            runs: RwLock::new(runs),
            manifest: Mutex::new(manifest),
            flush_lock: Mutex::new(()),
            compaction_guard: tokio::sync::Mutex::new(()),
            merge_task: Mutex::new(None),
            dir,
        };

        // Recovered data only exists in WAL segments; flush it so the
        // segments can retire and a second reopen is a no-op.
        if replayed > 0 {
            family.flush(true)?;
        }
        // Anything left in non-active segments is now durable in runs.
        family.wal.prune_retired()?;

        Ok(family)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn options(&self) -> &FamilyOptions {
        &self.options
    }

    // =========================================================================
    // Write path
    // =========================================================================

    pub(crate) fn put(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        self.apply_batch(&[BatchOp::Put { key, value, ttl }])
    }

    pub(crate) fn delete(&self, key: Bytes) -> Result<()> {
        self.apply_batch(&[BatchOp::Delete { key }])
    }

    /// Apply a batch of operations: WAL first (one fsync for the whole
    /// batch), then memtable, under the shared rotation lock so the
    /// batch shares one visibility point. A WAL failure aborts before
    /// anything becomes visible.
    pub(crate) fn apply_batch(&self, ops: &[BatchOp]) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let needs_flush = {
            let _shared = self.rotation.read();
            let now = unix_now();

            let records: Vec<Record> = ops
                .iter()
                .map(|op| {
                    let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
                    match op {
                        BatchOp::Put { key, value, ttl } => Record::put(
                            key.clone(),
                            value.clone(),
                            sequence,
                            ttl.map(|d| now + d.as_secs()),
                        ),
                        BatchOp::Delete { key } => Record::tombstone(key.clone(), sequence),
                    }
                })
                .collect();

            self.wal.append_batch(&records)?;

            let active = self.active.read().clone();
            for record in records {
                // Cannot fail with "frozen": freezing requires the
                // rotation lock held exclusively.
                active.insert(record)?;
            }

            active.size_bytes() >= self.options.flush_threshold
        };

        if needs_flush {
            self.flush(false)?;
        }
        Ok(())
    }

    // =========================================================================
    // Read path
    // =========================================================================

    /// Newest record for `key` across memtables and runs; visibility
    /// (tombstone/expiry) is resolved here.
    pub(crate) fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let record = match self.newest_record(key)? {
            Some(record) => record,
            None => return Ok(None),
        };

        if record.is_visible(unix_now()) {
            Ok(Some(record.value))
        } else {
            Ok(None)
        }
    }

    fn newest_record(&self, key: &[u8]) -> Result<Option<Record>> {
        // Active memtable always holds the newest version of any key it
        // contains.
        if let Some(record) = self.active.read().get(key) {
            return Ok(Some(record));
        }

        // Frozen memtables, newest first.
        {
            let frozen = self.frozen.read();
            for entry in frozen.iter().rev() {
                if let Some(record) = entry.memtable.get(key) {
                    return Ok(Some(record));
                }
            }
        }

        // Sorted runs, newest first.
        let runs: Vec<Arc<SortedRun>> = self.runs.read().clone();
        for run in &runs {
            if let Some(record) = run.get(key)? {
                return Ok(Some(record));
            }
        }

        Ok(None)
    }

    // =========================================================================
    // Flush pipeline
    // =========================================================================

    /// Freeze the active memtable (if warranted) and flush every frozen
    /// memtable to a sorted run. `force` flushes regardless of the
    /// threshold — used by explicit flush, recovery, and close.
    pub(crate) fn flush(&self, force: bool) -> Result<()> {
        self.freeze_active(force)?;
        if force {
            let serial = self.flush_lock.lock();
            self.drain_frozen(serial)
        } else {
            // If another flush is mid-drain it will pick up the table
            // we just froze; the writer that crossed the threshold
            // should not queue behind someone else's file work.
            match self.flush_lock.try_lock() {
                Some(serial) => self.drain_frozen(serial),
                None => Ok(()),
            }
        }
    }

    /// Step (1): atomically swap in a fresh memtable and rotate the WAL.
    fn freeze_active(&self, force: bool) -> Result<()> {
        let _exclusive = self.rotation.write();

        let active = self.active.read().clone();
        if active.is_empty() {
            return Ok(());
        }
        if !force && active.size_bytes() < self.options.flush_threshold {
            // Another writer already rotated ahead of us.
            return Ok(());
        }

        *self.active.write() = Arc::new(Memtable::new(&self.options.memtable));
        active.freeze();

        let next_sequence = self.sequence.load(Ordering::SeqCst);
        let segment = self.wal.rotate(next_sequence)?;

        self.frozen.write().push(FrozenMemtable {
            memtable: active,
            segment,
        });

        Ok(())
    }

    /// Steps (2)–(5) for every frozen memtable, oldest first. Failure
    /// leaves the frozen memtable and its WAL segment in place, so
    /// nothing is lost and the flush is retryable.
    fn drain_frozen(&self, _serial: parking_lot::MutexGuard<'_, ()>) -> Result<()> {
        loop {
            let next = self.frozen.read().first().cloned();
            let frozen = match next {
                Some(frozen) => frozen,
                None => return Ok(()),
            };

            self.flush_one(&frozen)?;

            // The run is durable and registered; the memtable and its
            // segment can go.
            self.frozen.write().remove(0);
            self.wal.remove_segment(&frozen.segment)?;
        }
    }

    fn flush_one(&self, frozen: &FrozenMemtable) -> Result<()> {
        let records = frozen.memtable.snapshot();
        if records.is_empty() {
            return Ok(());
        }

        let run_id = self.manifest.lock().next_run_id();
        let path = self.dir.join(RUNS_DIR).join(format!("{:06}.sst", run_id));

        debug!(
            family = %self.name,
            run_id,
            records = records.len(),
            "flushing memtable to sorted run"
        );

        let mut writer = RunWriter::create(
            &path,
            run_id,
            RunConfig::from_options(&self.options),
            records.len(),
        )?;
        for record in &records {
            if let Err(e) = writer.add(record) {
                let _ = writer.abort();
                return Err(e);
            }
        }
        let info = writer.finish()?;

        let run = Arc::new(SortedRun::open(info.clone())?);
        {
            let mut manifest = self.manifest.lock();
            manifest.register_flush(info);
            manifest.save()?;
            self.runs.write().insert(0, run);
        }

        info!(family = %self.name, run_id, "flush complete");
        Ok(())
    }

    // =========================================================================
    // Compaction support
    // =========================================================================

    pub(crate) fn runs_snapshot(&self) -> Vec<Arc<SortedRun>> {
        self.runs.read().clone()
    }

    pub(crate) fn next_run_id(&self) -> u64 {
        self.manifest.lock().next_run_id()
    }

    pub(crate) fn runs_dir(&self) -> PathBuf {
        self.dir.join(RUNS_DIR)
    }

    /// Swap merge inputs for their replacement (or for nothing, when
    /// the merge produced an empty run). The manifest is saved before
    /// the in-memory list changes; input files are unlinked by whoever
    /// drops the last reference.
    pub(crate) fn install_merge(
        &self,
        input_ids: &[u64],
        output: Option<(RunInfo, Arc<SortedRun>)>,
    ) -> Result<()> {
        let mut manifest = self.manifest.lock();
        match output {
            Some((info, run)) => {
                manifest.replace_runs(input_ids, info);
                manifest.save()?;

                let mut runs = self.runs.write();
                let insert_at = runs
                    .iter()
                    .position(|r| input_ids.contains(&r.id()))
                    .unwrap_or(runs.len());
                runs.retain(|r| {
                    if input_ids.contains(&r.id()) {
                        r.mark_obsolete();
                        false
                    } else {
                        true
                    }
                });
                let insert_at = insert_at.min(runs.len());
                runs.insert(insert_at, run);
            }
            None => {
                manifest.replace_runs_with_nothing(input_ids);
                manifest.save()?;

                self.runs.write().retain(|r| {
                    if input_ids.contains(&r.id()) {
                        r.mark_obsolete();
                        false
                    } else {
                        true
                    }
                });
            }
        }
        Ok(())
    }

    // =========================================================================
    // Cursor support
    // =========================================================================

    /// Point-in-time snapshot for a cursor: sorted record vectors for
    /// the active and frozen memtables (newest first) plus shared
    /// references to the current run list.
    pub(crate) fn cursor_snapshot(&self) -> (Vec<Vec<Record>>, Vec<Arc<SortedRun>>) {
        let mut memtables = Vec::new();
        memtables.push(self.active.read().snapshot());
        {
            let frozen = self.frozen.read();
            for entry in frozen.iter().rev() {
                memtables.push(entry.memtable.snapshot());
            }
        }
        (memtables, self.runs_snapshot())
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Stop the background merge task, if one is running.
    pub(crate) fn stop_merge_task(&self) -> bool {
        match self.merge_task.lock().take() {
            Some(task) => {
                task.stop();
                true
            }
            None => false,
        }
    }

    /// Delete every file belonging to this family. The caller has
    /// already removed it from the registry.
    pub(crate) fn destroy(&self) -> Result<()> {
        self.stop_merge_task();
        std::fs::remove_dir_all(&self.dir)?;
        info!(family = %self.name, "dropped column family");
        Ok(())
    }
}

/// Remove run files a crash left behind without a manifest entry: they
/// were never registered and must never be read.
fn remove_orphan_runs(runs_dir: &Path, known: &[RunInfo]) -> Result<()> {
    if !runs_dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(runs_dir)? {
        let path = entry?.path();
        if path.extension() != Some(std::ffi::OsStr::new("sst")) {
            continue;
        }
        if !known
            .iter()
            .any(|info| info.path.file_name() == path.file_name())
        {
            warn!(path = ?path, "removing orphan sorted run");
            let _ = std::fs::remove_file(&path);
        }
    }
    Ok(())
}
