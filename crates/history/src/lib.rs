//! Assessment history
//!
//! Stores `QualityMetrics` snapshots per dataset fingerprint on a small
//! key-value storage so later runs can be compared against earlier ones.

mod storage;
mod store;

pub use storage::{FileBackedStorage, InMemoryStorage, Storage};
pub use store::{record_key, AssessmentRecord, HistoryStore, DEFAULT_MAX_RECORDS};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, HistoryError>;
