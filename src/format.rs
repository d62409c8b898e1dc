//! Blob format resolution and decoding.
//!
//! A blob's file extension selects a `(codec, layout)` pair from a static
//! registry. Line-oriented layouts are row-addressable: when the index
//! supplies candidate rows, skipped lines are never parsed. Columnar
//! containers decode as a unit.

use std::{collections::BTreeMap, io::Read};

use flate2::read::GzDecoder;
use once_cell::sync::Lazy;

use crate::{
    error::{Error, Result},
    record::Record,
    value::Value,
};

/// Byte-level codec applied before structural parsing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    /// Raw bytes.
    Plain,
    /// Gzip-compressed bytes.
    Gzip,
}

/// Structural layout of the decoded bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// One JSON object per line.
    JsonLines,
    /// A single JSON object mapping column names to equal-length arrays.
    ColumnarJson,
}

/// Resolved format triple for one blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Format {
    /// Codec applied to the raw bytes.
    pub codec: Codec,
    /// Structural layout after decompression.
    pub layout: Layout,
}

impl Format {
    /// Whether candidate rows can be parsed without parsing skipped rows.
    #[must_use]
    pub fn row_addressable(&self) -> bool {
        matches!(self.layout, Layout::JsonLines)
    }

    /// Whether sidecar indexes are consulted for this format.
    ///
    /// Columnar containers decode as a unit, so index candidates save only
    /// predicate evaluation there; the registry keeps them off the pushdown
    /// path to match the write side, which emits sidecars for line layouts.
    #[must_use]
    pub fn pushdown_capable(&self) -> bool {
        matches!(self.layout, Layout::JsonLines)
    }
}

static REGISTRY: Lazy<BTreeMap<&'static str, Format>> = Lazy::new(|| {
    BTreeMap::from([
        (
            "jsonl",
            Format {
                codec: Codec::Plain,
                layout: Layout::JsonLines,
            },
        ),
        (
            "jsonl.gz",
            Format {
                codec: Codec::Gzip,
                layout: Layout::JsonLines,
            },
        ),
        (
            "jsonc",
            Format {
                codec: Codec::Plain,
                layout: Layout::ColumnarJson,
            },
        ),
        (
            "jsonc.gz",
            Format {
                codec: Codec::Gzip,
                layout: Layout::ColumnarJson,
            },
        ),
    ])
});

/// Resolve a blob name to its registered format; the longest matching
/// extension wins. Unknown extensions resolve to `None`, which the pipeline
/// treats as an empty (not failed) blob.
#[must_use]
pub fn resolve(name: &str) -> Option<Format> {
    let filename = name.rsplit('/').next().unwrap_or(name);
    REGISTRY
        .iter()
        .filter(|(ext, _)| {
            filename.len() > ext.len() + 1 && filename.ends_with(&format!(".{ext}"))
        })
        .max_by_key(|(ext, _)| ext.len())
        .map(|(_, format)| *format)
}

/// Undo the byte-level codec.
pub fn decompress(codec: Codec, blob: &str, bytes: Vec<u8>) -> Result<Vec<u8>> {
    match codec {
        Codec::Plain => Ok(bytes),
        Codec::Gzip => {
            let mut out = Vec::new();
            GzDecoder::new(bytes.as_slice())
                .read_to_end(&mut out)
                .map_err(|e| Error::blob_read(blob, format!("gzip: {e}")))?;
            Ok(out)
        }
    }
}

fn parse_json_record(blob: &str, text: &str) -> Result<Record> {
    let json: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| Error::blob_read(blob, format!("invalid json row: {e}")))?;
    match json {
        serde_json::Value::Object(map) => Ok(Record::from_json_object(&map)),
        other => Err(Error::blob_read(
            blob,
            format!("expected json object row, got {other}"),
        )),
    }
}

/// Decode a line-oriented blob, parsing only the rows in `candidates` when
/// one is supplied. Row positions are the zero-based ordinals of non-empty
/// lines, which is also the numbering the index builder sees.
pub fn decode_lines(
    blob: &str,
    bytes: &[u8],
    candidates: Option<&[u32]>,
) -> Result<Vec<(u32, Record)>> {
    let text =
        std::str::from_utf8(bytes).map_err(|e| Error::blob_read(blob, format!("utf-8: {e}")))?;
    let mut out = Vec::new();
    let mut wanted = candidates.map(|c| c.iter().copied());
    let mut next_wanted = wanted.as_mut().and_then(Iterator::next);
    for (row, line) in text.lines().filter(|l| !l.trim().is_empty()).enumerate() {
        let row = row as u32;
        if let Some(ref mut iter) = wanted {
            // Candidate lists are sorted ascending; skip until the next hit.
            while next_wanted.is_some_and(|w| w < row) {
                next_wanted = iter.next();
            }
            if next_wanted != Some(row) {
                continue;
            }
        }
        out.push((row, parse_json_record(blob, line)?));
    }
    Ok(out)
}

/// Decode a columnar container blob into positioned records.
pub fn decode_columnar(blob: &str, bytes: &[u8]) -> Result<Vec<(u32, Record)>> {
    let json: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::blob_read(blob, format!("invalid columnar json: {e}")))?;
    let serde_json::Value::Object(columns) = json else {
        return Err(Error::blob_read(blob, "expected columnar json object"));
    };
    let mut rows = 0usize;
    for (column, values) in &columns {
        match values {
            serde_json::Value::Array(items) => rows = rows.max(items.len()),
            _ => {
                return Err(Error::blob_read(
                    blob,
                    format!("column '{column}' is not an array"),
                ))
            }
        }
    }
    let mut out = Vec::with_capacity(rows);
    for row in 0..rows {
        let mut record = Record::new();
        for (column, values) in &columns {
            let cell = values
                .as_array()
                .and_then(|items| items.get(row))
                .map_or(Value::Null, Value::from_json);
            record.insert(column.clone(), cell);
        }
        out.push((row as u32, record));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_longest_extension() {
        assert_eq!(
            resolve("day/part-0.jsonl.gz"),
            Some(Format {
                codec: Codec::Gzip,
                layout: Layout::JsonLines,
            })
        );
        assert_eq!(
            resolve("part.jsonl").map(|f| f.codec),
            Some(Codec::Plain)
        );
        assert_eq!(resolve("part.parquet"), None);
        assert_eq!(resolve("jsonl"), None);
    }

    #[test]
    fn line_decoding_skips_non_candidates() {
        let body = b"{\"a\": 1}\n{\"a\": 2}\nnot json\n{\"a\": 4}\n";
        let rows = decode_lines("b.jsonl", body, Some(&[0, 3])).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1.value_or_null("a"), Value::Int(1));
        assert_eq!(rows[1].1.value_or_null("a"), Value::Int(4));
    }

    #[test]
    fn line_decoding_surfaces_bad_rows_when_parsed() {
        let body = b"{\"a\": 1}\nnot json\n";
        assert!(decode_lines("b.jsonl", body, None).is_err());
    }

    #[test]
    fn columnar_decoding_fills_ragged_columns_with_null() {
        let body = br#"{"a": [1, 2, 3], "b": ["x"]}"#;
        let rows = decode_columnar("b.jsonc", body).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].1.value_or_null("a"), Value::Int(3));
        assert_eq!(rows[2].1.value_or_null("b"), Value::Null);
    }
}
