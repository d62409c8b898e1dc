//! Per-blob scan state machine.
//!
//! One blob flows through: resolve format → pushdown → read → decode →
//! filter + project → optional caller sink. Every step can fail; any
//! failure is caught here, logged with the blob's identity, and converted
//! into "this blob contributed zero rows" — it never aborts the overall
//! scan. Only the scanner-level diagnostics expose that a blob was skipped.

use std::{panic::AssertUnwindSafe, sync::Arc};

use crate::{
    error::{Error, Result},
    format::{self, Layout},
    index::{sidecar_name, IndexReader},
    logging::granary_log,
    option::ScanOption,
    predicate::{Evaluator, Predicate, Pushdown, PushdownMode},
    record::Record,
    store::BlobStore,
};

/// Result of scanning one blob.
#[derive(Debug, Default)]
pub struct BlobOutcome {
    /// Surviving, projected records in within-blob order.
    pub records: Vec<Record>,
    /// Whether the blob was skipped because of a failure. Unknown formats
    /// are empty but not failed.
    pub failed: bool,
}

/// Caller-injected consumer of the filtered/projected stream.
pub trait RecordSink {
    /// Accept one surviving record.
    fn accept(&mut self, record: Record);
}

impl<F: FnMut(Record)> RecordSink for F {
    fn accept(&mut self, record: Record) {
        self(record)
    }
}

/// Scans single blobs against a fixed predicate and projection.
///
/// The predicate is compiled once per query and immutable for the scan's
/// lifetime; the pushdown extraction is computed here, up front.
pub struct ScanPipeline {
    store: Arc<dyn BlobStore>,
    predicate: Option<Predicate>,
    pushdown: Option<Pushdown>,
    projection: Option<Vec<String>>,
    evaluator: Evaluator,
}

impl ScanPipeline {
    /// Pipeline over `store` filtering by `predicate` (`None` passes all
    /// records).
    pub fn new(store: Arc<dyn BlobStore>, predicate: Option<Predicate>, option: &ScanOption) -> Self {
        Self {
            pushdown: predicate.as_ref().and_then(Predicate::pushdown),
            predicate,
            projection: option.projection.clone(),
            evaluator: Evaluator::with_like_capacity(option.like_cache_capacity),
            store,
        }
    }

    /// Run the state machine for one blob, isolating failures.
    pub fn scan_blob(&mut self, blob: &str) -> BlobOutcome {
        let mut records = Vec::new();
        let failed = self.scan_blob_into(blob, &mut |record| records.push(record));
        BlobOutcome { records, failed }
    }

    /// Like [`ScanPipeline::scan_blob`], streaming survivors into `sink`.
    /// Returns whether the blob failed.
    pub fn scan_blob_into(&mut self, blob: &str, sink: &mut dyn RecordSink) -> bool {
        let outcome =
            std::panic::catch_unwind(AssertUnwindSafe(|| self.try_scan(blob, sink)));
        match outcome {
            Ok(Ok(())) => false,
            Ok(Err(err)) => {
                granary_log!(log::Level::Warn, "blob_failed", "blob={blob} cause={err}");
                true
            }
            Err(_) => {
                granary_log!(log::Level::Error, "blob_panicked", "blob={blob}");
                true
            }
        }
    }

    fn try_scan(&mut self, blob: &str, sink: &mut dyn RecordSink) -> Result<()> {
        // 1. Resolve format; unknown extensions contribute nothing, quietly.
        let Some(resolved) = format::resolve(blob) else {
            granary_log!(log::Level::Debug, "blob_unknown_format", "blob={blob}");
            return Ok(());
        };

        // 2. Pushdown against available sidecar indexes.
        let candidates = if resolved.pushdown_capable() {
            self.candidates(blob)
        } else {
            None
        };
        if let Some(rows) = &candidates {
            if rows.is_empty() {
                // The index proved no row can match.
                return Ok(());
            }
        }

        // 3–4. Read and decode. Row-addressable layouts parse only the
        // candidate rows; containers decode as a unit.
        let raw = self.store.read_blob(blob)?;
        let bytes = format::decompress(resolved.codec, blob, raw)?;
        let rows = match resolved.layout {
            Layout::JsonLines => format::decode_lines(blob, &bytes, candidates.as_deref())?,
            Layout::ColumnarJson => format::decode_columnar(blob, &bytes)?,
        };

        // 5. Filter with the FULL predicate — pushdown results are hash
        // candidates and must be re-verified — then project.
        for (_, record) in rows {
            let keep = match &self.predicate {
                Some(predicate) => self.evaluator.matches(predicate, &record),
                None => true,
            };
            if !keep {
                continue;
            }
            let record = match &self.projection {
                Some(columns) => record.project(columns),
                None => record,
            };
            sink.accept(record);
        }
        Ok(())
    }

    /// Candidate rows from sidecar indexes, or `None` for "all rows".
    ///
    /// Index trouble is never fatal here: corrupt or missing sidecars
    /// degrade to a full scan of the blob.
    fn candidates(&self, blob: &str) -> Option<Vec<u32>> {
        let pushdown = self.pushdown.as_ref()?;
        match pushdown.mode {
            PushdownMode::Conjunctive => {
                let mut result: Option<Vec<u32>> = None;
                for term in &pushdown.terms {
                    let mut reader = match self.open_sidecar(blob, &term.field) {
                        SidecarState::Ready(reader) => reader,
                        // No index for this field: the term widens to all
                        // rows and drops out of the intersection.
                        SidecarState::Missing => continue,
                        SidecarState::Corrupt => return None,
                    };
                    let rows = reader.search_all(&term.values);
                    result = Some(match result {
                        Some(acc) => intersect_sorted(&acc, &rows),
                        None => rows,
                    });
                    if result.as_ref().is_some_and(Vec::is_empty) {
                        break;
                    }
                }
                result
            }
            PushdownMode::Disjunctive => {
                // Union is only a safe over-approximation when every branch
                // is answerable; one missing sidecar forces a full scan.
                let mut rows = Vec::new();
                for term in &pushdown.terms {
                    let mut reader = match self.open_sidecar(blob, &term.field) {
                        SidecarState::Ready(reader) => reader,
                        SidecarState::Missing | SidecarState::Corrupt => return None,
                    };
                    rows.extend(reader.search_all(&term.values));
                }
                rows.sort_unstable();
                rows.dedup();
                Some(rows)
            }
        }
    }

    fn open_sidecar(&self, blob: &str, field: &str) -> SidecarState {
        let name = sidecar_name(blob, field);
        match IndexReader::open(self.store.as_ref(), &name) {
            Ok(Some(reader)) => SidecarState::Ready(reader),
            Ok(None) => SidecarState::Missing,
            Err(err @ Error::IndexCorruption { .. }) => {
                granary_log!(
                    log::Level::Warn,
                    "index_corrupt_full_scan",
                    "blob={blob} index={name} cause={err}"
                );
                SidecarState::Corrupt
            }
            Err(err) => {
                granary_log!(
                    log::Level::Warn,
                    "index_open_failed",
                    "blob={blob} index={name} cause={err}"
                );
                SidecarState::Corrupt
            }
        }
    }
}

enum SidecarState {
    Ready(IndexReader),
    Missing,
    Corrupt,
}

fn intersect_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}
