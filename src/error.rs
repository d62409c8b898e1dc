//! Error surface.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by predicate parsing, index access, blob IO and scan
/// supervision.
///
/// Corruption of a single data blob is deliberately absent here: it is
/// isolated per blob inside the scan pipeline and surfaces through the
/// scan report and the log, never as a scan-wide failure.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed predicate text or literal structure.
    #[error("syntax error: {0}")]
    Syntax(String),
    /// A comparison operator the predicate language does not define.
    #[error("unknown operator: {0}")]
    UnknownOperator(String),
    /// A sidecar index whose bytes do not decode as index entries.
    #[error("index {name} corrupt: {reason}")]
    IndexCorruption { name: String, reason: String },
    /// Underlying store failed to list or read a blob.
    #[error("blob {blob}: {reason}")]
    BlobRead { blob: String, reason: String },
    /// No usable partitions exist for the requested range, even after
    /// the step-back policy was exhausted.
    #[error("data not found: {0}")]
    DataNotFound(String),
    /// A supervised scan exceeded its wall-clock ceiling.
    #[error("scan exceeded wall-clock limit of {limit:?}")]
    TimeoutExceeded { limit: Duration },
}

impl Error {
    /// Blob IO failure for `blob` with a human-readable `reason`.
    pub fn blob_read(blob: impl Into<String>, reason: impl ToString) -> Self {
        Error::BlobRead {
            blob: blob.into(),
            reason: reason.to_string(),
        }
    }
}
