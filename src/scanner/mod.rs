//! Concurrent orchestration of [`ScanPipeline`] across many blobs.
//!
//! Work is data-parallel across blobs only; records within one blob are
//! always processed in sequence by a single worker, so within-blob order is
//! preserved under every discipline. Workers pull blob names from a shared
//! queue and push bounded batches of records onto a shared bounded result
//! queue; the consumer drains the result queue as it fills. Producers block
//! with a timeout rather than growing memory unboundedly.

mod shutdown;

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

pub use shutdown::ShutdownToken;

use crate::{
    error::{Error, Result},
    logging::granary_log,
    option::ScanOption,
    pipeline::ScanPipeline,
    predicate::Predicate,
    record::Record,
    store::BlobStore,
};

/// Default worker pool size.
pub const DEFAULT_WORKERS: usize = 4;

/// Hard cap on the worker pool size.
pub const MAX_WORKERS: usize = 8;

/// Queue capacity multiplier for the supervised discipline, in batches.
const SUPERVISED_QUEUE_FACTOR: usize = 16;

/// How long a blocked producer waits before re-checking the shutdown token.
const SEND_TICK: Duration = Duration::from_millis(100);

/// How long the consumer waits before re-checking the deadline.
const RECV_TICK: Duration = Duration::from_millis(50);

/// Execution discipline for one scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Discipline {
    /// One worker; output order is blob order, then within-blob order.
    Serial,
    /// Bounded worker pool with no cross-blob ordering guarantee.
    Threaded {
        /// Requested pool size; clamped to `1..=MAX_WORKERS` and never more
        /// than the blob count.
        workers: usize,
    },
    /// Worker pool with a deeper result queue and a wall-clock ceiling that
    /// trips a cooperative shutdown, preventing indefinite hangs.
    Supervised {
        /// Requested pool size, clamped as for `Threaded`.
        workers: usize,
        /// Ceiling measured from launch.
        wall_clock_limit: Duration,
    },
}

impl Default for Discipline {
    fn default() -> Self {
        Discipline::Threaded {
            workers: DEFAULT_WORKERS,
        }
    }
}

impl Discipline {
    fn pool_size(self, blob_count: usize) -> usize {
        match self {
            Discipline::Serial => 1,
            Discipline::Threaded { workers } | Discipline::Supervised { workers, .. } => {
                workers.clamp(1, MAX_WORKERS).min(blob_count.max(1))
            }
        }
    }

    fn queue_capacity(self, pool: usize) -> usize {
        match self {
            Discipline::Serial | Discipline::Threaded { .. } => pool * 4,
            Discipline::Supervised { .. } => pool * SUPERVISED_QUEUE_FACTOR,
        }
    }

    fn wall_clock_limit(self) -> Option<Duration> {
        match self {
            Discipline::Supervised {
                wall_clock_limit, ..
            } => Some(wall_clock_limit),
            _ => None,
        }
    }
}

/// Diagnostic summary of one scan.
///
/// Partial results are never silent: `is_complete` is false whenever a blob
/// was skipped, abandoned or the ceiling tripped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Blobs offered to the scan.
    pub blobs_total: usize,
    /// Blobs scanned to completion.
    pub blobs_scanned: usize,
    /// Blobs attempted but skipped by a per-blob failure.
    pub blobs_skipped: usize,
    /// Whether the supervised ceiling tripped.
    pub timed_out: bool,
}

impl ScanReport {
    /// Whether every offered blob was scanned without failure.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.timed_out
            && self.blobs_skipped == 0
            && self.blobs_scanned == self.blobs_total
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct WorkerStats {
    scanned: usize,
    skipped: usize,
}

/// Runs a [`ScanPipeline`] over an ordered blob list under a chosen
/// discipline.
pub struct ConcurrentScanner {
    store: Arc<dyn BlobStore>,
    predicate: Option<Predicate>,
    option: ScanOption,
}

impl ConcurrentScanner {
    /// Scanner over `store` filtering by `predicate`.
    pub fn new(store: Arc<dyn BlobStore>, predicate: Option<Predicate>, option: ScanOption) -> Self {
        Self {
            store,
            predicate,
            option,
        }
    }

    /// Launch a scan; records stream back through the returned handle.
    pub fn scan(&self, blobs: Vec<String>, discipline: Discipline) -> ScanHandle {
        let blobs_total = blobs.len();
        let pool = discipline.pool_size(blobs_total);
        let (work_tx, work_rx) = flume::unbounded::<String>();
        for blob in blobs {
            // Pre-filled and closed: workers drain until empty.
            let _ = work_tx.send(blob);
        }
        drop(work_tx);

        let (batch_tx, batch_rx) = flume::bounded(discipline.queue_capacity(pool));
        let token = ShutdownToken::new();
        let mut workers = Vec::with_capacity(pool);
        for _ in 0..pool {
            let mut pipeline =
                ScanPipeline::new(self.store.clone(), self.predicate.clone(), &self.option);
            let work_rx = work_rx.clone();
            let batch_tx = batch_tx.clone();
            let token = token.clone();
            let batch_size = self.option.batch_size;
            workers.push(thread::spawn(move || {
                worker_loop(&mut pipeline, &work_rx, &batch_tx, &token, batch_size)
            }));
        }
        let wall_clock_limit = discipline.wall_clock_limit();
        ScanHandle {
            batch_rx,
            token,
            workers,
            blobs_total,
            deadline: wall_clock_limit.map(|d| Instant::now() + d),
            wall_clock_limit,
            timed_out: false,
        }
    }
}

fn worker_loop(
    pipeline: &mut ScanPipeline,
    work_rx: &flume::Receiver<String>,
    batch_tx: &flume::Sender<Vec<Record>>,
    token: &ShutdownToken,
    batch_size: usize,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    loop {
        if token.is_triggered() {
            break;
        }
        let Ok(blob) = work_rx.try_recv() else {
            // Pre-filled queue: empty means drained.
            break;
        };
        let outcome = pipeline.scan_blob(&blob);
        if outcome.failed {
            stats.skipped += 1;
        } else {
            stats.scanned += 1;
        }
        let mut batches = outcome.records.chunks(batch_size.max(1));
        let abandoned = batches.any(|batch| !send_batch(batch_tx, token, batch.to_vec()));
        if abandoned {
            granary_log!(
                log::Level::Debug,
                "worker_abandoned",
                "blob={blob} reason=shutdown"
            );
            break;
        }
    }
    stats
}

/// Blocking put with back-pressure; gives up when shutdown is requested.
fn send_batch(
    batch_tx: &flume::Sender<Vec<Record>>,
    token: &ShutdownToken,
    mut batch: Vec<Record>,
) -> bool {
    loop {
        match batch_tx.send_timeout(batch, SEND_TICK) {
            Ok(()) => return true,
            Err(flume::SendTimeoutError::Timeout(returned)) => {
                if token.is_triggered() {
                    return false;
                }
                batch = returned;
            }
            Err(flume::SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

/// Live scan: a stream of record batches plus the eventual report.
///
/// Dropping the handle (or calling [`ScanHandle::shutdown`]) requests a
/// cooperative stop; in-flight workers finish their current blob first.
pub struct ScanHandle {
    batch_rx: flume::Receiver<Vec<Record>>,
    token: ShutdownToken,
    workers: Vec<JoinHandle<WorkerStats>>,
    blobs_total: usize,
    deadline: Option<Instant>,
    wall_clock_limit: Option<Duration>,
    timed_out: bool,
}

impl ScanHandle {
    /// Request a cooperative stop.
    pub fn shutdown(&self) {
        self.token.trigger();
    }

    /// Next batch of records, or `None` when the scan is over (all workers
    /// done, or the wall-clock ceiling tripped).
    pub fn next_batch(&mut self) -> Option<Vec<Record>> {
        loop {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    self.timed_out = true;
                    self.token.trigger();
                    granary_log!(
                        log::Level::Warn,
                        "scan_wall_clock_exceeded",
                        "blobs_total={}",
                        self.blobs_total
                    );
                    return None;
                }
            }
            match self.batch_rx.recv_timeout(RECV_TICK) {
                Ok(batch) => return Some(batch),
                Err(flume::RecvTimeoutError::Timeout) => continue,
                Err(flume::RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Stop (if still running), join the workers and summarize.
    pub fn finish(mut self) -> ScanReport {
        self.token.trigger();
        let mut report = ScanReport {
            blobs_total: self.blobs_total,
            timed_out: self.timed_out,
            ..ScanReport::default()
        };
        for worker in std::mem::take(&mut self.workers) {
            match worker.join() {
                Ok(stats) => {
                    report.blobs_scanned += stats.scanned;
                    report.blobs_skipped += stats.skipped;
                }
                Err(_) => {
                    // A panicked worker loses only its in-flight blob; the
                    // shared queue let its siblings take the rest.
                    granary_log!(log::Level::Error, "worker_panicked", "");
                    report.blobs_skipped += 1;
                }
            }
        }
        report
    }

    /// Drain every batch, then summarize.
    pub fn collect(mut self) -> (Vec<Record>, ScanReport) {
        let mut records = Vec::new();
        while let Some(batch) = self.next_batch() {
            records.extend(batch);
        }
        (records, self.finish())
    }

    /// Like [`ScanHandle::collect`], but a tripped wall-clock ceiling is an
    /// error instead of a report flag.
    pub fn collect_strict(self) -> Result<(Vec<Record>, ScanReport)> {
        let limit = self.wall_clock_limit;
        let (records, report) = self.collect();
        if report.timed_out {
            return Err(Error::TimeoutExceeded {
                limit: limit.unwrap_or_default(),
            });
        }
        Ok((records, report))
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        self.token.trigger();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn store_with_blobs(blobs: usize, rows_per_blob: usize) -> (Arc<MemoryStore>, Vec<String>) {
        let store = Arc::new(MemoryStore::new());
        let mut names = Vec::new();
        for b in 0..blobs {
            let mut body = String::new();
            for r in 0..rows_per_blob {
                body.push_str(&format!("{{\"blob\": {b}, \"row\": {r}}}\n"));
            }
            let name = format!("day/part-{b}.jsonl");
            store.insert(name.clone(), body.into_bytes());
            names.push(name);
        }
        (store, names)
    }

    #[test]
    fn serial_discipline_preserves_blob_order() {
        let (store, blobs) = store_with_blobs(3, 4);
        let scanner = ConcurrentScanner::new(store, None, ScanOption::default().batch_size(2));
        let (records, report) = scanner.scan(blobs, Discipline::Serial).collect();
        assert_eq!(records.len(), 12);
        assert!(report.is_complete());
        let order: Vec<(i64, i64)> = records
            .iter()
            .map(|r| {
                let blob = match r.value_or_null("blob") {
                    crate::value::Value::Int(i) => i,
                    other => panic!("unexpected {other:?}"),
                };
                let row = match r.value_or_null("row") {
                    crate::value::Value::Int(i) => i,
                    other => panic!("unexpected {other:?}"),
                };
                (blob, row)
            })
            .collect();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(order, sorted);
    }

    #[test]
    fn threaded_discipline_preserves_within_blob_order() {
        let (store, blobs) = store_with_blobs(6, 10);
        let scanner = ConcurrentScanner::new(store, None, ScanOption::default().batch_size(3));
        let (records, report) = scanner
            .scan(blobs, Discipline::Threaded { workers: 4 })
            .collect();
        assert_eq!(records.len(), 60);
        assert!(report.is_complete());
        // Rows of each blob must arrive in ascending row order.
        let mut last_row = std::collections::HashMap::new();
        for record in &records {
            let blob = record.value_or_null("blob").index_key();
            let row = record.value_or_null("row").index_key().parse::<i64>().unwrap();
            let prev = last_row.insert(blob, row);
            if let Some(prev) = prev {
                assert!(row > prev, "within-blob order violated");
            }
        }
    }

    #[test]
    fn corrupted_blob_degrades_without_raising() {
        let (store, mut blobs) = store_with_blobs(1, 25);
        store.insert("day/part-bad.jsonl", b"corrupt bytes \xff not json\n".to_vec());
        blobs.push("day/part-bad.jsonl".into());
        let scanner = ConcurrentScanner::new(store, None, ScanOption::default());
        let (records, report) = scanner
            .scan(blobs, Discipline::Threaded { workers: 4 })
            .collect();
        assert_eq!(records.len(), 25);
        assert_eq!(report.blobs_scanned, 1);
        assert_eq!(report.blobs_skipped, 1);
        assert!(!report.is_complete());
    }

    #[test]
    fn pool_size_is_clamped() {
        assert_eq!(Discipline::Threaded { workers: 99 }.pool_size(100), 8);
        assert_eq!(Discipline::Threaded { workers: 4 }.pool_size(2), 2);
        assert_eq!(Discipline::Threaded { workers: 0 }.pool_size(10), 1);
        assert_eq!(Discipline::Serial.pool_size(10), 1);
    }

    #[test]
    fn supervised_ceiling_trips_the_token() {
        let (store, blobs) = store_with_blobs(2, 2);
        let scanner = ConcurrentScanner::new(store, None, ScanOption::default());
        let discipline = Discipline::Supervised {
            workers: 2,
            wall_clock_limit: Duration::from_secs(0),
        };
        let mut handle = scanner.scan(blobs, discipline);
        assert!(handle.next_batch().is_none());
        let report = handle.finish();
        assert!(report.timed_out);
        assert!(!report.is_complete());
    }

    #[test]
    fn strict_collection_raises_on_timeout() {
        let (store, blobs) = store_with_blobs(2, 2);
        let scanner = ConcurrentScanner::new(store, None, ScanOption::default());
        let discipline = Discipline::Supervised {
            workers: 2,
            wall_clock_limit: Duration::from_secs(0),
        };
        let result = scanner.scan(blobs, discipline).collect_strict();
        assert!(matches!(result, Err(Error::TimeoutExceeded { .. })));
    }

    #[test]
    fn early_shutdown_is_cooperative() {
        let (store, blobs) = store_with_blobs(8, 50);
        let scanner = ConcurrentScanner::new(store, None, ScanOption::default().batch_size(10));
        let mut handle = scanner.scan(blobs, Discipline::Threaded { workers: 2 });
        let first = handle.next_batch();
        assert!(first.is_some());
        handle.shutdown();
        let report = handle.finish();
        assert!(report.blobs_scanned <= 8);
    }
}
