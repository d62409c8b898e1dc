//! `granary` is an embedded scanning engine for date-partitioned blob
//! stores. It evaluates a small predicate language over JSON-shaped
//! records, prunes work through per-field sidecar hash indexes, and runs
//! blobs through a concurrent pipeline with per-blob failure isolation.
//!
//! The moving parts:
//!
//! - [`predicate`]: tokenizer, parser, DNF normalization and the
//!   row-level evaluator for expressions such as
//!   `age >= 21 AND name LIKE "A%"`.
//! - [`index`]: headerless 12-byte sidecar entries (term hash, row,
//!   run length), built at write time and binary-searched at scan time.
//! - [`catalog`]: date-range expansion over a `{date}` path template
//!   with as-at snapshot selection and step-back.
//! - [`pipeline`]: the per-blob state machine (resolve, prune, read,
//!   decode, re-verify, project).
//! - [`scanner`]: serial, threaded and supervised scan disciplines over
//!   a shared [`BlobStore`].
//!
//! A pruned scan never changes results: candidate rows from an index are
//! always re-verified against the full predicate, so a missing or corrupt
//! sidecar only costs time.
//!
//! ```
//! use std::sync::Arc;
//!
//! use granary::{ConcurrentScanner, Discipline, MemoryStore, Predicate, ScanOption};
//!
//! let store = Arc::new(MemoryStore::new());
//! store.insert(
//!     "day/part-000.jsonl",
//!     b"{\"name\":\"ada\",\"age\":36}\n{\"name\":\"max\",\"age\":11}\n".to_vec(),
//! );
//!
//! let predicate = Predicate::parse("age >= 21").unwrap();
//! let scanner = ConcurrentScanner::new(store, Some(predicate), ScanOption::default());
//! let (records, report) = scanner
//!     .scan(vec!["day/part-000.jsonl".into()], Discipline::Serial)
//!     .collect();
//! assert_eq!(records.len(), 1);
//! assert!(report.is_complete());
//! ```

pub mod catalog;
pub mod cursor;
pub mod error;
pub mod format;
pub mod index;
mod logging;
pub mod option;
pub mod pipeline;
pub mod predicate;
pub mod record;
pub mod scanner;
pub mod store;
pub mod value;

pub use catalog::{blobs_from, CatalogConfig, Partition, PartitionCatalog};
pub use cursor::Cursor;
pub use error::{Error, Result};
pub use format::Format;
pub use index::{sidecar_name, IndexReader, IndexWriterPool};
pub use option::ScanOption;
pub use pipeline::{BlobOutcome, ScanPipeline};
pub use predicate::{CompareOp, Evaluator, Predicate};
pub use record::Record;
pub use scanner::{ConcurrentScanner, Discipline, ScanHandle, ScanReport, ShutdownToken};
pub use store::{BlobStore, LocalStore, MemoryStore};
pub use value::Value;
