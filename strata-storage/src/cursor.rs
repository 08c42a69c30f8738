//! Snapshot cursor over one column family.
//!
//! `init` captures the active memtable contents, the frozen memtables,
//! and the current run list; writes and compactions after that point
//! are invisible. Iteration is an n-way merge across the snapshot
//! sources in key order, ties resolved toward the highest sequence
//! number, with keys whose newest version is a tombstone (or expired)
//! hidden.
//!
//! `next`/`prev` return `Ok(false)` at the boundaries — running off
//! either end is an expected outcome, not an error — and the cursor can
//! change direction at any time.

use std::sync::Arc;

use bytes::Bytes;

use strata_core::error::Result;
use strata_core::unix_now;

use crate::record::Record;
use crate::sstable::SortedRun;

enum Source {
    /// Sorted, unique-key record vector from a memtable snapshot.
    Mem(Vec<Record>),
    /// Shared reference to an immutable run; keeps the file alive even
    /// if compaction retires it mid-iteration.
    Run(Arc<SortedRun>),
}

impl Source {
    fn first(&self) -> Result<Option<Record>> {
        match self {
            Source::Mem(records) => Ok(records.first().cloned()),
            Source::Run(run) => run.first_record(),
        }
    }

    fn last(&self) -> Result<Option<Record>> {
        match self {
            Source::Mem(records) => Ok(records.last().cloned()),
            Source::Run(run) => run.last_record(),
        }
    }

    /// First record with key strictly greater than `key`.
    fn seek_after(&self, key: &[u8]) -> Result<Option<Record>> {
        match self {
            Source::Mem(records) => {
                let idx = records.partition_point(|r| r.key.as_ref() <= key);
                Ok(records.get(idx).cloned())
            }
            Source::Run(run) => run.seek_after(key),
        }
    }

    /// Last record with key strictly less than `key`.
    fn seek_before(&self, key: &[u8]) -> Result<Option<Record>> {
        match self {
            Source::Mem(records) => {
                let idx = records.partition_point(|r| r.key.as_ref() < key);
                Ok(idx.checked_sub(1).and_then(|i| records.get(i)).cloned())
            }
            Source::Run(run) => run.seek_before(key),
        }
    }
}

enum Position {
    /// Before the first record.
    Start,
    /// On a record.
    At(Record),
    /// After the last record.
    End,
}

pub struct Cursor {
    sources: Vec<Source>,
    position: Position,
    /// Expiry is evaluated against the snapshot instant, so the view
    /// stays consistent for the cursor's lifetime.
    now: u64,
}

impl Cursor {
    pub(crate) fn new(memtables: Vec<Vec<Record>>, runs: Vec<Arc<SortedRun>>) -> Result<Self> {
        let mut sources: Vec<Source> = memtables.into_iter().map(Source::Mem).collect();
        sources.extend(runs.into_iter().map(Source::Run));

        let mut cursor = Self {
            sources,
            position: Position::Start,
            now: unix_now(),
        };
        // Land on the first visible record, matching the init contract.
        cursor.next()?;
        Ok(cursor)
    }

    /// Key/value at the current position, or `None` when positioned
    /// before the first or past the last record.
    pub fn get(&self) -> Option<(Bytes, Bytes)> {
        match &self.position {
            Position::At(record) => Some((record.key.clone(), record.value.clone())),
            _ => None,
        }
    }

    /// Advance to the next visible record. `Ok(false)` past the end.
    pub fn next(&mut self) -> Result<bool> {
        let mut from: Option<Bytes> = match &self.position {
            Position::Start => None,
            Position::At(record) => Some(record.key.clone()),
            Position::End => return Ok(false),
        };

        loop {
            let candidate = self.newest_after(from.as_deref())?;
            match candidate {
                None => {
                    self.position = Position::End;
                    return Ok(false);
                }
                Some(record) if record.is_visible(self.now) => {
                    self.position = Position::At(record);
                    return Ok(true);
                }
                // Newest version is a tombstone or expired: hide the
                // key and keep walking.
                Some(record) => from = Some(record.key),
            }
        }
    }

    /// Step back to the previous visible record. `Ok(false)` before the
    /// start.
    pub fn prev(&mut self) -> Result<bool> {
        let mut from: Option<Bytes> = match &self.position {
            Position::End => None,
            Position::At(record) => Some(record.key.clone()),
            Position::Start => return Ok(false),
        };

        loop {
            let candidate = self.newest_before(from.as_deref())?;
            match candidate {
                None => {
                    self.position = Position::Start;
                    return Ok(false);
                }
                Some(record) if record.is_visible(self.now) => {
                    self.position = Position::At(record);
                    return Ok(true);
                }
                Some(record) => from = Some(record.key),
            }
        }
    }

    /// Reposition on the first visible record.
    pub fn seek_first(&mut self) -> Result<bool> {
        self.position = Position::Start;
        self.next()
    }

    /// Reposition on the last visible record.
    pub fn seek_last(&mut self) -> Result<bool> {
        self.position = Position::End;
        self.prev()
    }

    /// Smallest key strictly after `from` (or the overall first),
    /// resolved to its newest version across all sources.
    fn newest_after(&self, from: Option<&[u8]>) -> Result<Option<Record>> {
        let mut best: Option<Record> = None;
        for source in &self.sources {
            let candidate = match from {
                None => source.first()?,
                Some(key) => source.seek_after(key)?,
            };
            best = pick_forward(best, candidate);
        }
        Ok(best)
    }

    /// Largest key strictly before `from` (or the overall last),
    /// resolved to its newest version across all sources.
    fn newest_before(&self, from: Option<&[u8]>) -> Result<Option<Record>> {
        let mut best: Option<Record> = None;
        for source in &self.sources {
            let candidate = match from {
                None => source.last()?,
                Some(key) => source.seek_before(key)?,
            };
            best = pick_backward(best, candidate);
        }
        Ok(best)
    }
}

fn pick_forward(best: Option<Record>, candidate: Option<Record>) -> Option<Record> {
    merge_pick(best, candidate, /* forward = */ true)
}

fn pick_backward(best: Option<Record>, candidate: Option<Record>) -> Option<Record> {
    merge_pick(best, candidate, /* forward = */ false)
}

fn merge_pick(best: Option<Record>, candidate: Option<Record>, forward: bool) -> Option<Record> {
    let candidate = match candidate {
        Some(c) => c,
        None => return best,
    };
    let best = match best {
        Some(b) => b,
        None => return Some(candidate),
    };

    match candidate.key.cmp(&best.key) {
        std::cmp::Ordering::Equal => {
            // Same key from two sources: the highest sequence wins.
            if candidate.sequence > best.sequence {
                Some(candidate)
            } else {
                Some(best)
            }
        }
        std::cmp::Ordering::Less => {
            if forward {
                Some(candidate)
            } else {
                Some(best)
            }
        }
        std::cmp::Ordering::Greater => {
            if forward {
                Some(best)
            } else {
                Some(candidate)
            }
        }
    }
}
