//! Compaction: merging sorted runs into fewer, larger ones.
//!
//! Two modes, both replacing their inputs atomically — a merged output
//! is fsynced and registered in the manifest before any input leaves
//! the run list, and input files are only unlinked once the last
//! reference (run list or cursor snapshot) drops.
//!
//! - **On-demand full merge**: pairs runs oldest-first and merges the
//!   pairs concurrently, bounded by a caller-supplied thread budget.
//!   The pair containing the oldest run has nothing older left to
//!   shadow, so it drops tombstones and expired records; every other
//!   pair retains them.
//! - **Background partial merge**: a cancellable periodic task that
//!   merges the two oldest runs whenever the family's run count reaches
//!   the configured minimum. Always tombstone-retaining.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use strata_core::error::{Error, Result};
use strata_core::unix_now;

use crate::family::ColumnFamily;
use crate::merge::{MergeIterator, MergeMode};
use crate::record::Record;
use crate::sstable::{RunConfig, RunWriter, SortedRun};

/// Handle to a running background partial-merge task.
pub(crate) struct MergeTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MergeTask {
    pub(crate) fn stop(self) {
        let _ = self.shutdown.send(true);
        self.handle.abort();
    }
}

/// On-demand full merge over the family's current run set.
pub(crate) async fn compact(family: Arc<ColumnFamily>, max_threads: usize) -> Result<()> {
    let _exclusive = family.compaction_guard.lock().await;

    let runs = family.runs_snapshot();
    if runs.len() < 2 {
        return Ok(());
    }

    info!(
        family = family.name(),
        runs = runs.len(),
        max_threads,
        "starting on-demand compaction"
    );

    // Pair from the oldest end; a trailing unpaired (newest) run stays.
    let oldest_first: Vec<Arc<SortedRun>> = runs.iter().rev().cloned().collect();
    let semaphore = Arc::new(Semaphore::new(max_threads.max(1)));
    let mut handles = Vec::new();

    for (pair_idx, pair) in oldest_first.chunks(2).enumerate() {
        if pair.len() < 2 {
            break;
        }

        // Only the pair holding the oldest run covers everything a
        // tombstone in it could shadow.
        let mode = if pair_idx == 0 {
            MergeMode::Full
        } else {
            MergeMode::Partial
        };

        let older = pair[0].clone();
        let newer = pair[1].clone();
        let family = Arc::clone(&family);
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Compaction {
                reason: "compaction semaphore closed".to_string(),
            })?;

        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            merge_runs(&family, &[newer, older], mode)
        }));
    }

    for handle in handles {
        handle.await.map_err(|e| Error::Compaction {
            reason: format!("compaction worker panicked: {}", e),
        })??;
    }

    info!(family = family.name(), "on-demand compaction finished");
    Ok(())
}

/// Start the periodic partial-merge task for a family. Errors if one is
/// already running.
pub(crate) fn start_background_partial_merge(
    family: Arc<ColumnFamily>,
    period: Duration,
    min_run_count: usize,
) -> Result<()> {
    if period.is_zero() {
        return Err(Error::Configuration {
            message: "partial merge period must be positive".to_string(),
        });
    }

    let mut slot = family.merge_task.lock();
    if slot.is_some() {
        return Err(Error::Compaction {
            reason: format!(
                "background partial merge already running for family {:?}",
                family.name()
            ),
        });
    }

    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let task_family = Arc::clone(&family);

    let handle = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately; the
        // contract is "every `period`", so consume it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = partial_merge_once(&task_family, min_run_count).await {
                        error!(
                            family = task_family.name(),
                            error = %e,
                            "background partial merge failed"
                        );
                    }
                }
                _ = shutdown_rx.changed() => {
                    info!(family = task_family.name(), "stopping background partial merge");
                    break;
                }
            }
        }
    });

    info!(
        family = family.name(),
        period_secs = period.as_secs(),
        min_run_count,
        "started background partial merge"
    );

    *slot = Some(MergeTask { shutdown, handle });
    Ok(())
}

/// One background tick: merge the two oldest runs if the family has
/// accumulated at least `min_run_count`. Skips the tick entirely when
/// an on-demand compaction is in flight.
async fn partial_merge_once(family: &Arc<ColumnFamily>, min_run_count: usize) -> Result<()> {
    let _exclusive = match family.compaction_guard.try_lock() {
        Ok(guard) => guard,
        Err(_) => return Ok(()),
    };

    let runs = family.runs_snapshot();
    if runs.len() < min_run_count.max(2) {
        return Ok(());
    }

    let older = runs[runs.len() - 1].clone();
    let newer = runs[runs.len() - 2].clone();
    debug!(
        family = family.name(),
        older = older.id(),
        newer = newer.id(),
        "background partial merge of oldest pair"
    );

    let family = Arc::clone(family);
    tokio::task::spawn_blocking(move || {
        merge_runs(&family, &[newer, older], MergeMode::Partial)
    })
    .await
    .map_err(|e| Error::Compaction {
        reason: format!("partial merge worker panicked: {}", e),
    })?
}

/// K-way merge of `inputs` (newest first) into one replacement run.
///
/// A failure mid-write aborts the partial output file and leaves the
/// inputs untouched and retryable; the replacement only becomes real
/// once it is fsynced and swapped into the manifest.
pub(crate) fn merge_runs(
    family: &ColumnFamily,
    inputs: &[Arc<SortedRun>],
    mode: MergeMode,
) -> Result<()> {
    let input_ids: Vec<u64> = inputs.iter().map(|r| r.id()).collect();
    let expected: u64 = inputs.iter().map(|r| r.info().record_count).sum();

    let run_id = family.next_run_id();
    let path = family.runs_dir().join(format!("{:06}.sst", run_id));

    let sources: Vec<Box<dyn Iterator<Item = Result<Record>> + '_>> = inputs
        .iter()
        .map(|run| Box::new(run.iter()) as Box<dyn Iterator<Item = Result<Record>> + '_>)
        .collect();
    let merged = MergeIterator::new(sources)?;

    let mut writer = RunWriter::create(
        &path,
        run_id,
        RunConfig::from_options(family.options()),
        expected as usize,
    )?;

    let now = unix_now();
    let mut written = 0u64;
    for record in merged {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                let _ = writer.abort();
                return Err(e);
            }
        };

        // Dropped versions: anything this merge proves obsolete.
        if mode == MergeMode::Full && (record.tombstone || record.is_expired(now)) {
            continue;
        }

        if let Err(e) = writer.add(&record) {
            let _ = writer.abort();
            return Err(e);
        }
        written += 1;
    }

    if written == 0 {
        writer.abort()?;
        family.install_merge(&input_ids, None)?;
        debug!(
            family = family.name(),
            inputs = ?input_ids,
            "merge eliminated every record"
        );
        return Ok(());
    }

    let info = writer.finish()?;
    let run = Arc::new(SortedRun::open(info.clone())?);
    family.install_merge(&input_ids, Some((info, run)))?;

    debug!(
        family = family.name(),
        inputs = ?input_ids,
        output = run_id,
        records = written,
        "merged sorted runs"
    );
    Ok(())
}
