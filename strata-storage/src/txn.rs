//! Buffered-write transactions.
//!
//! A transaction buffers puts and deletes — each op naming its target
//! family — and applies them atomically at commit: per family, every
//! operation is WAL-appended and fsynced before any of them becomes
//! visible in the memtable, so a runtime failure leaves nothing
//! applied. Rollback discards the buffer without touching the engine.
//!
//! State machine: `Open → (put|delete)* → commit → Committed`, or
//! `rollback → RolledBack`; a commit that failed lands in `Aborted`.
//! Operating on a transaction in any closed state is a usage error,
//! reported distinctly from I/O faults.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use strata_core::error::{Error, Result};

use crate::db::DbInner;
use crate::family::{BatchOp, ColumnFamily};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Open,
    Committed,
    RolledBack,
    /// A commit attempt failed; the buffer was not applied.
    Aborted,
}

impl TxnState {
    fn as_str(&self) -> &'static str {
        match self {
            TxnState::Open => "open",
            TxnState::Committed => "committed",
            TxnState::RolledBack => "rolled back",
            TxnState::Aborted => "aborted",
        }
    }
}

enum TxnOp {
    Put {
        family: String,
        key: Bytes,
        value: Bytes,
        ttl: Option<Duration>,
    },
    Delete {
        family: String,
        key: Bytes,
    },
}

pub struct Transaction {
    db: Arc<DbInner>,
    ops: Vec<TxnOp>,
    state: TxnState,
}

impl Transaction {
    pub(crate) fn new(db: Arc<DbInner>) -> Self {
        Self {
            db,
            ops: Vec::new(),
            state: TxnState::Open,
        }
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state != TxnState::Open {
            return Err(Error::TransactionClosed {
                state: self.state.as_str(),
            });
        }
        Ok(())
    }

    /// Buffer a put. Target families are resolved at commit time.
    pub fn put(
        &mut self,
        family: impl Into<String>,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.ensure_open()?;
        self.ops.push(TxnOp::Put {
            family: family.into(),
            key: key.into(),
            value: value.into(),
            ttl,
        });
        Ok(())
    }

    /// Buffer a delete.
    pub fn delete(&mut self, family: impl Into<String>, key: impl Into<Bytes>) -> Result<()> {
        self.ensure_open()?;
        self.ops.push(TxnOp::Delete {
            family: family.into(),
            key: key.into(),
        });
        Ok(())
    }

    /// Apply every buffered operation. All families are resolved before
    /// anything is written, so an unknown name fails the commit with no
    /// state change.
    pub async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;

        // Group per family, preserving op order within each group.
        let mut batches: BTreeMap<String, Vec<BatchOp>> = BTreeMap::new();
        for op in self.ops.drain(..) {
            match op {
                TxnOp::Put {
                    family,
                    key,
                    value,
                    ttl,
                } => batches
                    .entry(family)
                    .or_default()
                    .push(BatchOp::Put { key, value, ttl }),
                TxnOp::Delete { family, key } => {
                    batches.entry(family).or_default().push(BatchOp::Delete { key })
                }
            }
        }

        let mut resolved: Vec<(Arc<ColumnFamily>, Vec<BatchOp>)> = Vec::new();
        for (name, ops) in batches {
            match self.db.family(&name) {
                Ok(family) => resolved.push((family, ops)),
                Err(e) => {
                    self.state = TxnState::Aborted;
                    return Err(e);
                }
            }
        }

        for (family, ops) in &resolved {
            if let Err(e) = family.apply_batch(ops) {
                self.state = TxnState::Aborted;
                return Err(e);
            }
        }

        self.state = TxnState::Committed;
        debug!(families = resolved.len(), "transaction committed");
        Ok(())
    }

    /// Discard the buffer with no engine-visible effect.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.ops.clear();
        self.state = TxnState::RolledBack;
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        // An open transaction dropped without commit is an implicit
        // rollback; nothing was ever applied.
        if self.state == TxnState::Open {
            self.state = TxnState::RolledBack;
        }
    }
}
