//! Primitive types shared across the engine.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

/// Raw key bytes.
pub type Key = Bytes;

/// Raw value bytes.
pub type Value = Bytes;

/// Current wall-clock time as unix seconds.
///
/// Used for record expiry; a clock that answers before the epoch is a
/// broken environment, treated as time zero rather than a panic.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
