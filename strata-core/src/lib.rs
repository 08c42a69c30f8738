//! # StrataDB Core
//!
//! Fundamental building blocks shared by the StrataDB storage engine:
//! - Error types
//! - Column family configuration
//! - Common primitive types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   strata-core                   │
//! ├─────────────────────────────────────────────────┤
//! │  • error   - Error taxonomy and Result alias    │
//! │  • config  - Column family options              │
//! │  • types   - Key/Value primitives               │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{CompressionAlgorithm, FamilyOptions, MemtableKind};
pub use error::{Error, Result};
pub use types::{unix_now, Key, Value};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
