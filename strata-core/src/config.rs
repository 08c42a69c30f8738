//! # Configuration
//!
//! Per-column-family options. Validation happens synchronously at family
//! creation; a family that was created keeps the options it was created
//! with (persisted in its manifest) across reopens.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Compression applied to sorted-run data blocks.
///
/// Changing the algorithm only affects newly written runs; existing runs
/// carry their own per-block compression tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionAlgorithm {
    Zstd,
    Snappy,
}

/// Which data structure backs a family's memtable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MemtableKind {
    /// Probabilistic skip list: native sorted iteration, expected
    /// O(log n) operations. `max_level` bounds tower height,
    /// `probability` is the per-level promotion chance.
    SkipList { max_level: usize, probability: f64 },

    /// Hash table: O(1) point lookups, sorted on snapshot.
    HashTable,
}

impl Default for MemtableKind {
    fn default() -> Self {
        MemtableKind::SkipList {
            max_level: DEFAULT_SKIP_MAX_LEVEL,
            probability: DEFAULT_SKIP_PROBABILITY,
        }
    }
}

pub const DEFAULT_FLUSH_THRESHOLD: usize = 64 * 1024 * 1024; // 64MB
pub const DEFAULT_SKIP_MAX_LEVEL: usize = 12;
pub const DEFAULT_SKIP_PROBABILITY: f64 = 0.25;
pub const MAX_SKIP_LEVEL: usize = 32;

/// Options for one column family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyOptions {
    /// Memtable byte size that triggers a flush to a sorted run.
    pub flush_threshold: usize,

    /// Memtable data structure.
    pub memtable: MemtableKind,

    /// Compress sorted-run data blocks when writing new runs.
    pub compression_enabled: bool,

    /// Algorithm used when `compression_enabled` is set.
    pub compression: CompressionAlgorithm,

    /// Build and consult a per-run bloom filter.
    pub bloom_filter: bool,
}

impl Default for FamilyOptions {
    fn default() -> Self {
        Self {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            memtable: MemtableKind::default(),
            compression_enabled: true,
            compression: CompressionAlgorithm::Zstd,
            bloom_filter: true,
        }
    }
}

impl FamilyOptions {
    /// Reject invalid parameter combinations before any state changes.
    pub fn validate(&self) -> Result<()> {
        if self.flush_threshold == 0 {
            return Err(Error::Configuration {
                message: "flush_threshold must be positive".to_string(),
            });
        }

        if let MemtableKind::SkipList {
            max_level,
            probability,
        } = self.memtable
        {
            if max_level == 0 || max_level > MAX_SKIP_LEVEL {
                return Err(Error::Configuration {
                    message: format!(
                        "skip list max_level must be in 1..={}, got {}",
                        MAX_SKIP_LEVEL, max_level
                    ),
                });
            }
            if !(probability > 0.0 && probability < 1.0) {
                return Err(Error::Configuration {
                    message: format!(
                        "skip list probability must be in (0, 1), got {}",
                        probability
                    ),
                });
            }
        }

        Ok(())
    }
}

/// Validate a column family name: it becomes a directory name on disk.
pub fn validate_family_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Configuration {
            message: "column family name must not be empty".to_string(),
        });
    }
    if name
        .chars()
        .any(|c| c == '/' || c == '\\' || c == '\0' || c == '.')
    {
        return Err(Error::Configuration {
            message: format!("column family name {:?} contains reserved characters", name),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_validate() {
        FamilyOptions::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_skip_parameters() {
        let mut opts = FamilyOptions {
            memtable: MemtableKind::SkipList {
                max_level: 0,
                probability: 0.25,
            },
            ..Default::default()
        };
        assert!(opts.validate().is_err());

        opts.memtable = MemtableKind::SkipList {
            max_level: 12,
            probability: 1.5,
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn rejects_zero_threshold() {
        let opts = FamilyOptions {
            flush_threshold: 0,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn rejects_pathy_family_names() {
        assert!(validate_family_name("orders").is_ok());
        assert!(validate_family_name("").is_err());
        assert!(validate_family_name("a/b").is_err());
        assert!(validate_family_name("..").is_err());
    }

    #[test]
    fn options_round_trip_through_json() {
        let opts = FamilyOptions::default();
        let json = serde_json::to_string(&opts).unwrap();
        let back: FamilyOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back.flush_threshold, opts.flush_threshold);
        assert_eq!(back.bloom_filter, opts.bloom_filter);
    }
}
