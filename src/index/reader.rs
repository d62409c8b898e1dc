//! Read path: binary search over the fixed-width entry file.

use std::collections::{HashMap, VecDeque};

use super::{hash_term, IndexEntry, ENTRY_LEN};
use crate::{
    error::{Error, Result},
    logging::granary_log,
    store::BlobStore,
    value::Value,
};

const GROUP_CACHE_CAPACITY: usize = 32;

/// Read-only searcher over one sidecar index.
///
/// The index image is loaded once at open (sidecars are small next to their
/// data blobs); lookups address entries by `entry_index * 12` within it.
/// Lookups are stateless apart from a small bounded cache of recently read
/// runs, so one reader per worker needs no further synchronization.
#[derive(Debug)]
pub struct IndexReader {
    name: String,
    bytes: Vec<u8>,
    entry_count: usize,
    groups: GroupCache,
}

impl IndexReader {
    /// Open a sidecar index, if one exists.
    ///
    /// A missing or unreadable sidecar yields `Ok(None)` — the index is an
    /// optimization, never a correctness dependency. A present file with a
    /// length that is not a multiple of 12 is a corruption signal.
    pub fn open(store: &dyn BlobStore, name: &str) -> Result<Option<Self>> {
        let bytes = match store.read_blob(name) {
            Ok(bytes) => bytes,
            Err(err) => {
                granary_log!(
                    log::Level::Debug,
                    "index_unavailable",
                    "index={name} cause={err}"
                );
                return Ok(None);
            }
        };
        if bytes.len() % ENTRY_LEN != 0 {
            return Err(Error::IndexCorruption {
                name: name.to_owned(),
                reason: format!("length {} is not a multiple of {ENTRY_LEN}", bytes.len()),
            });
        }
        let entry_count = bytes.len() / ENTRY_LEN;
        Ok(Some(Self {
            name: name.to_owned(),
            bytes,
            entry_count,
            groups: GroupCache::new(GROUP_CACHE_CAPACITY),
        }))
    }

    /// Sidecar blob name this reader was opened from.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of entries in the index.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    fn entry_at(&self, index: usize) -> IndexEntry {
        let offset = index * ENTRY_LEN;
        let chunk: &[u8; ENTRY_LEN] = self.bytes[offset..offset + ENTRY_LEN]
            .try_into()
            .expect("entry bounds checked");
        IndexEntry::decode(chunk)
    }

    /// Candidate row positions for one search term.
    ///
    /// Positions are candidates only; 32-bit hash collisions are possible
    /// and the caller must re-verify against the row's real value.
    pub fn search(&mut self, term: &Value) -> Vec<u32> {
        self.search_all(std::slice::from_ref(term))
    }

    /// Candidate row positions for any of `terms` (the `IN` form), unioned,
    /// sorted and deduplicated. A zero-entry index yields an empty result.
    pub fn search_all(&mut self, terms: &[Value]) -> Vec<u32> {
        let mut rows = Vec::new();
        for term in terms {
            rows.extend(self.lookup_hash(hash_term(term)));
        }
        rows.sort_unstable();
        rows.dedup();
        rows
    }

    fn lookup_hash(&mut self, hash: u32) -> Vec<u32> {
        if let Some(rows) = self.groups.get(hash) {
            return rows;
        }
        let rows = self.collect_run(hash);
        self.groups.insert(hash, rows.clone());
        rows
    }

    /// Classic binary search over fixed-size records, then a backward
    /// `run_length - 1` jump to the run start and a forward walk collecting
    /// the run: O(log n + k).
    fn collect_run(&self, hash: u32) -> Vec<u32> {
        let mut lo = 0usize;
        let mut hi = self.entry_count;
        let mut found = None;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let entry = self.entry_at(mid);
            match entry.hash.cmp(&hash) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => {
                    found = Some((mid, entry));
                    break;
                }
            }
        }
        let Some((position, entry)) = found else {
            return Vec::new();
        };
        // Any member knows its distance to the run start.
        let start = position - (entry.run_length.saturating_sub(1) as usize);
        let mut rows = Vec::new();
        let mut index = start;
        while index < self.entry_count {
            let member = self.entry_at(index);
            if member.hash != hash {
                break;
            }
            rows.push(member.row);
            index += 1;
        }
        rows
    }
}

/// Bounded FIFO cache of recently read runs.
#[derive(Debug)]
struct GroupCache {
    capacity: usize,
    groups: HashMap<u32, Vec<u32>>,
    order: VecDeque<u32>,
}

impl GroupCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            groups: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, hash: u32) -> Option<Vec<u32>> {
        self.groups.get(&hash).cloned()
    }

    fn insert(&mut self, hash: u32, rows: Vec<u32>) {
        if self.groups.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.groups.remove(&evicted);
            }
        }
        if self.groups.insert(hash, rows).is_none() {
            self.order.push_back(hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{index::IndexBuilder, store::MemoryStore};

    fn build_index(values: &[(u32, &str)]) -> Vec<u8> {
        let mut builder = IndexBuilder::new();
        for (row, value) in values {
            builder.push(*row, &Value::from(*value));
        }
        builder.finish_bytes()
    }

    #[test]
    fn search_returns_all_rows_of_a_run() {
        let store = MemoryStore::new();
        store.insert(
            "_SYS.part.username.idx",
            build_index(&[(0, "BBCNews"), (1, "Reuters"), (2, "BBCNews"), (3, "AP")]),
        );
        let mut reader = IndexReader::open(&store, "_SYS.part.username.idx")
            .unwrap()
            .unwrap();
        assert_eq!(reader.search(&Value::from("BBCNews")), vec![0, 2]);
        assert_eq!(reader.search(&Value::from("AP")), vec![3]);
        assert!(reader.search(&Value::from("absent")).is_empty());
    }

    #[test]
    fn multi_term_search_unions_candidates() {
        let store = MemoryStore::new();
        store.insert(
            "_SYS.part.username.idx",
            build_index(&[(0, "a"), (1, "b"), (2, "c"), (3, "a")]),
        );
        let mut reader = IndexReader::open(&store, "_SYS.part.username.idx")
            .unwrap()
            .unwrap();
        assert_eq!(
            reader.search_all(&[Value::from("a"), Value::from("c")]),
            vec![0, 2, 3]
        );
    }

    #[test]
    fn zero_entry_index_returns_empty_not_error() {
        let store = MemoryStore::new();
        store.insert("_SYS.part.username.idx", Vec::new());
        let mut reader = IndexReader::open(&store, "_SYS.part.username.idx")
            .unwrap()
            .unwrap();
        assert!(reader.search(&Value::from("anything")).is_empty());
    }

    #[test]
    fn missing_sidecar_is_not_an_error() {
        let store = MemoryStore::new();
        assert!(IndexReader::open(&store, "_SYS.part.username.idx")
            .unwrap()
            .is_none());
    }

    #[test]
    fn ragged_sidecar_is_corruption() {
        let store = MemoryStore::new();
        store.insert("_SYS.part.username.idx", vec![0u8; 10]);
        assert!(matches!(
            IndexReader::open(&store, "_SYS.part.username.idx"),
            Err(Error::IndexCorruption { .. })
        ));
    }

    #[test]
    fn large_index_matches_linear_scan() {
        let usernames = ["BBCNews", "Reuters", "AP", "AFP", "DPA"];
        let mut builder = IndexBuilder::new();
        let mut expected = Vec::new();
        for row in 0..50u32 {
            let name = usernames[fastrand::usize(..usernames.len())];
            builder.push(row, &Value::from(name));
            if name == "BBCNews" {
                expected.push(row);
            }
        }
        let store = MemoryStore::new();
        store.insert("_SYS.feed.username.idx", builder.finish_bytes());
        let mut reader = IndexReader::open(&store, "_SYS.feed.username.idx")
            .unwrap()
            .unwrap();
        assert_eq!(reader.search(&Value::from("BBCNews")), expected);
    }
}
