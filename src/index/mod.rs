//! On-disk per-field sidecar index.
//!
//! An index file is a headerless sequence of fixed 12-byte entries sorted
//! ascending by hashed value. Entries sharing a hash form a contiguous run;
//! each member stores its 1-based position within the run, so the last
//! member's `run_length` is the run's full length counted backward from it.
//! That lets the reader jump from any binary-search hit to the run start in
//! `run_length - 1` steps without storing explicit boundaries.
//!
//! Hashes live in a 32-bit space, so search results are CANDIDATES only:
//! the caller must re-apply the original comparison against the fetched
//! row's real value before accepting a match.

mod builder;
mod reader;

pub use builder::{IndexBuilder, IndexWriterPool};
pub use reader::IndexReader;

use crate::{
    error::{Error, Result},
    value::Value,
};

/// Fixed byte width of one serialized entry.
pub const ENTRY_LEN: usize = 12;

/// Filename prefix marking system sidecar blobs.
pub const SIDECAR_PREFIX: &str = "_SYS.";

/// Filename suffix of index sidecars.
pub const SIDECAR_SUFFIX: &str = ".idx";

/// Hash a field value into the index key space: `crc32(key) mod (2^32 - 1)`.
///
/// Build and search both go through [`Value::index_key`], so values equal
/// under value semantics hash identically.
#[must_use]
pub fn hash_term(value: &Value) -> u32 {
    crc32fast::hash(value.index_key().as_bytes()) % u32::MAX
}

/// One 12-byte index entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    /// Hashed field value.
    pub hash: u32,
    /// Row position of the value inside its blob.
    pub row: u32,
    /// 1-based position of this entry within its equal-hash run.
    pub run_length: u32,
}

impl IndexEntry {
    /// Serialize to the fixed little-endian layout.
    #[must_use]
    pub fn encode(&self) -> [u8; ENTRY_LEN] {
        let mut buf = [0u8; ENTRY_LEN];
        buf[0..4].copy_from_slice(&self.hash.to_le_bytes());
        buf[4..8].copy_from_slice(&self.row.to_le_bytes());
        buf[8..12].copy_from_slice(&self.run_length.to_le_bytes());
        buf
    }

    /// Deserialize from exactly [`ENTRY_LEN`] bytes.
    #[must_use]
    pub fn decode(buf: &[u8; ENTRY_LEN]) -> Self {
        let word = |range: std::ops::Range<usize>| {
            u32::from_le_bytes(buf[range].try_into().expect("4-byte slice"))
        };
        Self {
            hash: word(0..4),
            row: word(4..8),
            run_length: word(8..12),
        }
    }
}

/// Decode a whole index image, checking the length invariant.
pub fn decode_entries(name: &str, bytes: &[u8]) -> Result<Vec<IndexEntry>> {
    if bytes.len() % ENTRY_LEN != 0 {
        return Err(Error::IndexCorruption {
            name: name.to_owned(),
            reason: format!("length {} is not a multiple of {ENTRY_LEN}", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(ENTRY_LEN)
        .map(|chunk| IndexEntry::decode(chunk.try_into().expect("exact chunk")))
        .collect())
}

/// Sidecar blob name for `field` of `blob`:
/// `<dir>/_SYS.<blob-stem>.<sanitized-field-name>.idx`.
#[must_use]
pub fn sidecar_name(blob: &str, field: &str) -> String {
    let (dir, filename) = match blob.rsplit_once('/') {
        Some((dir, filename)) => (Some(dir), filename),
        None => (None, blob),
    };
    let stem = filename.split('.').next().unwrap_or(filename);
    let sidecar = format!(
        "{SIDECAR_PREFIX}{stem}.{}{SIDECAR_SUFFIX}",
        sanitize_field(field)
    );
    match dir {
        Some(dir) => format!("{dir}/{sidecar}"),
        None => sidecar,
    }
}

/// Collapse a field reference to filename-safe characters.
#[must_use]
pub fn sanitize_field(field: &str) -> String {
    field
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
