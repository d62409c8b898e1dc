//! Serializable scan-resumption marker.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Position reached by a scan: the partition's integer id and the blob
/// offset within it. Produced as blobs complete; owned entirely by the
/// caller — the core never mutates a caller-held cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Integer partition id (days since the Unix epoch for calendar
    /// partitions).
    pub partition: u64,
    /// Blob offset within the partition.
    pub offset: u64,
}

impl Cursor {
    /// Start of a partition.
    #[must_use]
    pub fn at(partition: u64, offset: u64) -> Self {
        Self { partition, offset }
    }

    /// Serialize to the wire form `{ "partition": N, "offset": N }`.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("cursor serializes infallibly")
    }

    /// Deserialize the wire form.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Syntax(format!("invalid cursor: {e}")))
    }
}
