//! Error types for trial-store
//!
//! Two fault classes matter to callers: storage faults (the store file or its
//! directory could not be read, written or decoded) and shape faults (a
//! variable's fields would stop being row-aligned). Neither is recovered
//! locally.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// trial-store error types
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (Parquet/Arrow decoding, unexpected store shape)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error tied to a specific file or directory
    #[error("IO error at {}: {source}", .path.display())]
    PathIo {
        /// Path being accessed
        path: PathBuf,
        /// Underlying IO failure
        #[source]
        source: std::io::Error,
    },

    /// Field lengths within one variable disagree (internal consistency fault)
    #[error(
        "Shape mismatch in variable '{variable}', field '{field}': expected {expected} rows, got {actual}\nRecords must stay row-aligned. Please report this issue."
    )]
    ShapeMismatch {
        /// Variable whose record is misaligned
        variable: String,
        /// Offending field
        field: String,
        /// Row count of the record
        expected: usize,
        /// Row count of the offending field
        actual: usize,
    },

    /// Incoming rows cannot be appended without breaking row alignment
    #[error("Schema mismatch in variable '{variable}': {reason}")]
    SchemaMismatch {
        /// Variable being merged
        variable: String,
        /// What differs between the existing and incoming record
        reason: String,
    },

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON (de)serialization of store metadata failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True for faults raised while reading, writing or decoding the store.
    #[must_use]
    pub const fn is_storage_fault(&self) -> bool {
        matches!(
            self,
            Self::StorageError(_)
                | Self::PathIo { .. }
                | Self::Io(_)
                | Self::Arrow(_)
                | Self::Serialization(_)
        )
    }

    /// True for row-alignment faults within a variable's record.
    #[must_use]
    pub const fn is_shape_fault(&self) -> bool {
        matches!(self, Self::ShapeMismatch { .. } | Self::SchemaMismatch { .. })
    }

    pub(crate) fn path_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::PathIo {
            path: path.into(),
            source,
        }
    }
}
