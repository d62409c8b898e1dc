//! Byte-access contract for blob storage, plus the two reference adapters.
//!
//! The scan machinery depends only on [`BlobStore`]; credentials, retries and
//! bucket semantics belong to storage-specific adapters outside this crate.
//! [`MemoryStore`] and [`LocalStore`] exist so the crate is usable and
//! testable without any remote backend.

use std::{
    collections::BTreeMap,
    fs,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::RwLock,
};

use crate::error::{Error, Result};

/// Minimal byte-access contract implemented by storage adapters.
///
/// Blob names are `/`-separated paths relative to the store root. Listings
/// are returned in lexicographic order so partition expansion is
/// deterministic across adapters.
pub trait BlobStore: Send + Sync {
    /// List blob names beginning with `prefix`, in lexicographic order.
    fn list_blobs(&self, prefix: &str) -> Result<Vec<String>>;

    /// Read an entire blob.
    fn read_blob(&self, name: &str) -> Result<Vec<u8>>;

    /// Read `len` bytes starting at `offset`, clamped to the blob's end.
    ///
    /// The default implementation reads the whole blob and slices; adapters
    /// with native range reads should override it.
    fn read_blob_range(&self, name: &str, offset: u64, len: u64) -> Result<Vec<u8>> {
        let bytes = self.read_blob(name)?;
        Ok(slice_range(&bytes, offset, len))
    }
}

fn slice_range(bytes: &[u8], offset: u64, len: u64) -> Vec<u8> {
    let start = (offset as usize).min(bytes.len());
    let end = start.saturating_add(len as usize).min(bytes.len());
    bytes[start..end].to_vec()
}

/// In-memory adapter backed by a sorted map. Intended for tests and for
/// embedding small fixture datasets.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a blob.
    pub fn insert(&self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.blobs
            .write()
            .expect("memory store lock poisoned")
            .insert(name.into(), bytes.into());
    }

    /// Remove a blob if present.
    pub fn remove(&self, name: &str) {
        self.blobs
            .write()
            .expect("memory store lock poisoned")
            .remove(name);
    }
}

impl BlobStore for MemoryStore {
    fn list_blobs(&self, prefix: &str) -> Result<Vec<String>> {
        let blobs = self.blobs.read().expect("memory store lock poisoned");
        Ok(blobs
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn read_blob(&self, name: &str) -> Result<Vec<u8>> {
        let blobs = self.blobs.read().expect("memory store lock poisoned");
        blobs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::blob_read(name, "not found"))
    }

    fn read_blob_range(&self, name: &str, offset: u64, len: u64) -> Result<Vec<u8>> {
        let blobs = self.blobs.read().expect("memory store lock poisoned");
        let bytes = blobs
            .get(name)
            .ok_or_else(|| Error::blob_read(name, "not found"))?;
        Ok(slice_range(bytes, offset, len))
    }
}

/// Directory-backed adapter. Blob names map to paths under the root.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Adapter rooted at `root`; the directory does not need to exist until
    /// the first listing.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in name.split('/') {
            path.push(part);
        }
        path
    }

    fn walk(&self, dir: &Path, out: &mut Vec<String>) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                self.walk(&path, out)?;
            } else if let Ok(rel) = path.strip_prefix(&self.root) {
                let name = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push(name);
            }
        }
        Ok(())
    }
}

impl BlobStore for LocalStore {
    fn list_blobs(&self, prefix: &str) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        self.walk(&self.root, &mut names)
            .map_err(|e| Error::blob_read(prefix, e))?;
        names.retain(|name| name.starts_with(prefix));
        names.sort();
        Ok(names)
    }

    fn read_blob(&self, name: &str) -> Result<Vec<u8>> {
        fs::read(self.resolve(name)).map_err(|e| Error::blob_read(name, e))
    }

    fn read_blob_range(&self, name: &str, offset: u64, len: u64) -> Result<Vec<u8>> {
        let mut file = fs::File::open(self.resolve(name)).map_err(|e| Error::blob_read(name, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| Error::blob_read(name, e))?;
        let mut buf = Vec::new();
        file.take(len)
            .read_to_end(&mut buf)
            .map_err(|e| Error::blob_read(name, e))?;
        Ok(buf)
    }
}
