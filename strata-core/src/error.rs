//! # Error Handling
//!
//! Error types for StrataDB operations.
//!
//! ## Design Principles
//!
//! 1. **Actionable**: every error carries the context needed to act on it
//! 2. **Classified**: configuration mistakes, I/O faults and usage errors
//!    are distinct variants, never folded into one another
//! 3. **Honest about absence**: a missing key is not an error — point
//!    lookups return `Ok(None)` and cursor bounds return `Ok(false)`

use thiserror::Error;

/// Result type alias for StrataDB operations
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for StrataDB
#[derive(Error, Debug)]
pub enum Error {
    // Storage Errors
    #[error("WAL error: {message}")]
    WriteAheadLog {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("sorted run error: {message}")]
    SortedRun {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("memtable error: {message}")]
    Memtable { message: String },

    #[error("compaction failed: {reason}")]
    Compaction { reason: String },

    #[error("corruption detected: {message}")]
    Corruption { message: String },

    // Registry Errors
    #[error("column family not found: {name}")]
    FamilyNotFound { name: String },

    #[error("column family already exists: {name}")]
    FamilyExists { name: String },

    // Usage Errors
    #[error("transaction is {state}, no further operations accepted")]
    TransactionClosed { state: &'static str },

    #[error("database is closed")]
    Closed,

    // System Errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl Error {
    /// Check if the error is recoverable by retrying the operation
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Compaction { .. } => true,
            Error::Io { .. } => false,
            Error::Corruption { .. } => false,
            Error::Closed => false,
            _ => true,
        }
    }

    /// Get error code for monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::WriteAheadLog { .. } => "WAL_ERROR",
            Error::SortedRun { .. } => "SORTED_RUN_ERROR",
            Error::Memtable { .. } => "MEMTABLE_ERROR",
            Error::Compaction { .. } => "COMPACTION_ERROR",
            Error::Corruption { .. } => "CORRUPTION",
            Error::FamilyNotFound { .. } => "FAMILY_NOT_FOUND",
            Error::FamilyExists { .. } => "FAMILY_EXISTS",
            Error::TransactionClosed { .. } => "TXN_CLOSED",
            Error::Closed => "DB_CLOSED",
            Error::Io { .. } => "IO_ERROR",
            Error::Configuration { .. } => "CONFIG_ERROR",
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        let err = Error::FamilyNotFound {
            name: "orders".into(),
        };
        assert_eq!(err.error_code(), "FAMILY_NOT_FOUND");
        assert!(err.is_recoverable());

        let err = Error::Corruption {
            message: "bad block".into(),
        };
        assert_eq!(err.error_code(), "CORRUPTION");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err: Error = io.into();
        assert_eq!(err.error_code(), "IO_ERROR");
    }
}
