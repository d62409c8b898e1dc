//! Index construction on the ingestion path.

use std::{
    collections::HashMap,
    sync::Mutex,
};

use super::{hash_term, sidecar_name, IndexEntry};
use crate::{record::Record, value::Value};

/// Accumulates `(hash, row)` pairs for one field of one blob and emits the
/// sorted on-disk image.
///
/// Values inside a sequence are indexed individually, so a `CONTAINS` search
/// term hashes straight to the element entries.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    pairs: Vec<(u32, u32)>,
}

impl IndexBuilder {
    /// Empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one field value at row position `row`.
    pub fn push(&mut self, row: u32, value: &Value) {
        match value {
            Value::Null => {}
            Value::List(items) => {
                for item in items {
                    self.push(row, item);
                }
            }
            scalar => self.pairs.push((hash_term(scalar), row)),
        }
    }

    /// Number of accumulated pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether nothing has been indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Sort and assign run lengths, producing the final entry sequence.
    #[must_use]
    pub fn finish(mut self) -> Vec<IndexEntry> {
        self.pairs.sort_unstable();
        let mut entries = Vec::with_capacity(self.pairs.len());
        let mut run_length = 0u32;
        let mut previous_hash = None;
        for (hash, row) in self.pairs {
            // Run lengths count upward within a run and reset at boundaries,
            // so the last member always carries the run's full length.
            run_length = if previous_hash == Some(hash) {
                run_length + 1
            } else {
                1
            };
            previous_hash = Some(hash);
            entries.push(IndexEntry {
                hash,
                row,
                run_length,
            });
        }
        entries
    }

    /// Serialized on-disk image.
    #[must_use]
    pub fn finish_bytes(self) -> Vec<u8> {
        let entries = self.finish();
        let mut bytes = Vec::with_capacity(entries.len() * super::ENTRY_LEN);
        for entry in &entries {
            bytes.extend_from_slice(&entry.encode());
        }
        bytes
    }
}

/// Writer-side pool of per-field builders for one blob.
///
/// Ingestion feeds rows from multiple producers, so the shared accumulators
/// sit behind a mutex; the read path never needs this.
#[derive(Debug)]
pub struct IndexWriterPool {
    fields: Vec<String>,
    builders: Mutex<HashMap<String, IndexBuilder>>,
}

impl IndexWriterPool {
    /// Pool indexing the given fields.
    pub fn new(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        Self {
            builders: Mutex::new(
                fields
                    .iter()
                    .map(|f| (f.clone(), IndexBuilder::new()))
                    .collect(),
            ),
            fields,
        }
    }

    /// Fields this pool indexes.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Feed one record at row position `row` into every per-field builder.
    pub fn observe(&self, row: u32, record: &Record) {
        let mut builders = self.builders.lock().expect("index pool lock poisoned");
        for field in &self.fields {
            if let (Some(value), Some(builder)) = (record.get(field), builders.get_mut(field)) {
                builder.push(row, value);
            }
        }
    }

    /// Finalize all builders into `(sidecar name, bytes)` pairs for `blob`.
    /// Fields that saw no values still emit a valid zero-entry sidecar.
    #[must_use]
    pub fn finish(self, blob: &str) -> Vec<(String, Vec<u8>)> {
        let mut builders = self
            .builders
            .into_inner()
            .expect("index pool lock poisoned");
        self.fields
            .iter()
            .filter_map(|field| {
                builders
                    .remove(field)
                    .map(|b| (sidecar_name(blob, field), b.finish_bytes()))
            })
            .collect()
    }
}
